//! Gateway wire types: the inbound invocation event and the outbound response envelope.
//!
//! Every inbound field is optional on the wire; missing or `null` values decode to empty.

use crate::error::AdapterError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

/// API gateway invocation event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationEvent {
    #[serde(default, deserialize_with = "nullable")]
    pub headers: HashMap<String, String>,
    #[serde(rename = "httpMethod", default, deserialize_with = "nullable")]
    pub method: String,
    #[serde(default, deserialize_with = "nullable")]
    pub path: String,
    /// Query parameters. Values of an unsupported shape are dropped while decoding.
    #[serde(rename = "queryString", default, deserialize_with = "query_string")]
    pub query: BTreeMap<String, QueryValue>,
    /// Body as delivered by the gateway; forwarded without decoding.
    #[serde(default, deserialize_with = "nullable")]
    pub body: String,
    #[serde(rename = "requestContext", default, deserialize_with = "nullable")]
    pub context: RequestContext,
}

/// A query parameter value: one string, or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Multi(Vec<String>),
}

/// Gateway request context attached to every event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, deserialize_with = "nullable")]
    pub service_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub request_id: String,
    #[serde(rename = "httpMethod", default, deserialize_with = "nullable")]
    pub method: String,
    #[serde(default, deserialize_with = "nullable")]
    pub path: String,
    #[serde(default, deserialize_with = "nullable")]
    pub source_ip: String,
    #[serde(default, deserialize_with = "nullable")]
    pub stage: String,
    #[serde(default, deserialize_with = "nullable")]
    pub identity: Identity,
}

/// Caller identity. `secret_id` is only set for authenticated callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<String>,
}

/// Response envelope returned to the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub is_base64_encoded: bool,
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl InvocationEvent {
    /// Decode an event from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AdapterError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl QueryValue {
    /// Values in the order they are emitted on the query string.
    pub fn values(&self) -> &[String] {
        match self {
            QueryValue::Single(v) => std::slice::from_ref(v),
            QueryValue::Multi(vs) => vs,
        }
    }

    /// Classify a raw JSON value. `None` for anything but a string or an array of strings.
    fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(QueryValue::Single(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(QueryValue::Multi),
            _ => None,
        }
    }
}

impl ResponseEnvelope {
    /// Envelope handed back when the target could not be reached or read.
    pub fn internal_error() -> Self {
        Self {
            status_code: 500,
            ..Self::default()
        }
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn query_string<'de, D>(deserializer: D) -> Result<BTreeMap<String, QueryValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    let mut query = BTreeMap::new();
    for (name, value) in raw.unwrap_or_default() {
        match QueryValue::from_json(value) {
            Some(v) => {
                query.insert(name, v);
            }
            None => log::warn!(
                "dropping query parameter {:?}: value is not a string or list of strings",
                name
            ),
        }
    }
    Ok(query)
}
