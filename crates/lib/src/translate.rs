//! Event ⇄ HTTP translation. Pure functions, no I/O.
//!
//! `build_request` turns a gateway event into a request against the co-located server;
//! `build_envelope` turns the server's response into the gateway envelope.

use crate::error::AdapterError;
use crate::event::{InvocationEvent, QueryValue, RequestContext, ResponseEnvelope};
use crate::mime::BinaryMimeRegistry;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use std::collections::{BTreeMap, HashMap};

/// The target server always runs on loopback.
pub const HOST: &str = "127.0.0.1";

pub const HEADER_SERVICE_ID: &str = "x-apigateway-serviceid";
pub const HEADER_REQUEST_ID: &str = "x-apigateway-requestid";
pub const HEADER_METHOD: &str = "x-apigateway-method";
pub const HEADER_PATH: &str = "x-apigateway-path";
pub const HEADER_SOURCE_IP: &str = "x-apigateway-sourceip";
pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";
pub const HEADER_STAGE: &str = "x-apigateway-stage";
pub const HEADER_SECRET_ID: &str = "x-apigateway-secretid";
pub const HEADER_SCF_REQUEST_ID: &str = "x-scf-requestid";

/// Framing and routing headers owned by the transport; never copied from the event.
const TRANSPORT_HEADERS: &[&str] = &["host", "content-length", "transfer-encoding", "connection"];

/// Request to send to the target server.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Response read back from the target server.
#[derive(Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Build the outbound request for `event` against `http://127.0.0.1:{port}`.
///
/// `caller_request_id` is the function runtime's own request id; when present it is
/// forwarded as `x-scf-requestid`.
pub fn build_request(
    event: InvocationEvent,
    port: u16,
    caller_request_id: Option<&str>,
) -> Result<OutboundRequest, AdapterError> {
    let method = if event.method.is_empty() {
        Method::GET
    } else {
        Method::from_bytes(event.method.as_bytes()).map_err(|_| {
            AdapterError::InvalidRequest(format!("invalid http method {:?}", event.method))
        })?
    };
    let url = target_url(port, &event.path, &event.query)?;
    let headers = outbound_headers(&event.headers, &event.context, caller_request_id);
    Ok(OutboundRequest {
        method,
        url,
        headers,
        body: event.body.into_bytes(),
    })
}

/// The path goes through WHATWG URL parsing: dot segments (`.`, `..`, `%2e%2e`) are resolved
/// and characters outside the path set are percent-encoded. `x-apigateway-path` still carries
/// the gateway's own path unchanged.
fn target_url(
    port: u16,
    path: &str,
    query: &BTreeMap<String, QueryValue>,
) -> Result<Url, AdapterError> {
    let mut url = Url::parse(&format!("http://{}:{}", HOST, port))
        .map_err(|e| AdapterError::InvalidRequest(format!("target url: {}", e)))?;
    if path.starts_with('/') {
        url.set_path(path);
    } else {
        url.set_path(&format!("/{}", path));
    }
    if url.path() != path {
        log::debug!("event path {:?} sent as {:?}", path, url.path());
    }
    append_query(&mut url, query);
    Ok(url)
}

/// Form-encoded: keys in sorted order, list values in the order given.
fn append_query(url: &mut Url, query: &BTreeMap<String, QueryValue>) {
    if query.values().all(|v| v.values().is_empty()) {
        return;
    }
    let mut pairs = url.query_pairs_mut();
    for (name, value) in query {
        for v in value.values() {
            pairs.append_pair(name, v);
        }
    }
}

fn outbound_headers(
    forwarded: &HashMap<String, String>,
    ctx: &RequestContext,
    caller_request_id: Option<&str>,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(forwarded.len() + 9);
    for (name, value) in forwarded {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                if TRANSPORT_HEADERS.contains(&name.as_str()) {
                    log::debug!("not forwarding transport header {}", name);
                    continue;
                }
                headers.append(name, value);
            }
            _ => log::warn!("dropping header {:?}: not a valid http header", name),
        }
    }

    let metadata = [
        (HEADER_SERVICE_ID, ctx.service_id.as_str()),
        (HEADER_REQUEST_ID, ctx.request_id.as_str()),
        (HEADER_METHOD, ctx.method.as_str()),
        (HEADER_PATH, ctx.path.as_str()),
        (HEADER_SOURCE_IP, ctx.source_ip.as_str()),
        (HEADER_FORWARDED_FOR, ctx.source_ip.as_str()),
        (HEADER_STAGE, ctx.stage.as_str()),
    ];
    for (name, value) in metadata {
        headers.insert(HeaderName::from_static(name), metadata_value(value));
    }
    set_optional(&mut headers, HEADER_SECRET_ID, ctx.identity.secret_id.as_deref());
    set_optional(&mut headers, HEADER_SCF_REQUEST_ID, caller_request_id);
    headers
}

fn set_optional(headers: &mut HeaderMap, name: &'static str, value: Option<&str>) {
    let name = HeaderName::from_static(name);
    match value {
        Some(v) => {
            headers.insert(name, metadata_value(v));
        }
        None => {
            headers.remove(name);
        }
    }
}

/// Metadata headers are always sent, so control characters are stripped rather than
/// dropping the header. The kept bytes are exactly those `HeaderValue` accepts.
fn metadata_value(value: &str) -> HeaderValue {
    let cleaned: Vec<u8> = value
        .bytes()
        .filter(|b| *b == b'\t' || (*b >= 0x20 && *b != 0x7f))
        .collect();
    if cleaned.len() != value.len() {
        log::warn!("stripping control characters from metadata header value {:?}", value);
    }
    HeaderValue::from_bytes(&cleaned).expect("control characters were stripped")
}

/// Build the gateway envelope from the target's response.
///
/// Repeated response headers collapse to their first value.
pub fn build_envelope(
    response: TransportResponse,
    binary_mime_types: &BinaryMimeRegistry,
) -> ResponseEnvelope {
    let mut headers = HashMap::with_capacity(response.headers.keys_len());
    for name in response.headers.keys() {
        if let Some(value) = response.headers.get(name) {
            headers.insert(
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
    }

    let is_base64_encoded = response
        .headers
        .get(CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .is_some_and(|ct| binary_mime_types.is_binary(&ct));

    let body = if is_base64_encoded {
        STANDARD.encode(&response.body)
    } else {
        String::from_utf8(response.body)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
    };

    ResponseEnvelope {
        is_base64_encoded,
        status_code: response.status.as_u16(),
        headers,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Identity;

    fn event() -> InvocationEvent {
        InvocationEvent {
            method: "GET".into(),
            path: "/hello".into(),
            ..Default::default()
        }
    }

    fn response(content_type: Option<&str>, body: &[u8]) -> TransportResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        TransportResponse {
            status: StatusCode::OK,
            headers,
            body: body.to_vec(),
        }
    }

    #[test]
    fn no_query_params_means_no_query_component() {
        let req = build_request(event(), 9000, None).unwrap();
        assert_eq!(req.url.as_str(), "http://127.0.0.1:9000/hello");
        assert_eq!(req.url.query(), None);
    }

    #[test]
    fn empty_list_values_add_no_query_component() {
        let mut e = event();
        e.query.insert("a".into(), QueryValue::Multi(vec![]));
        let req = build_request(e, 9000, None).unwrap();
        assert_eq!(req.url.query(), None);
    }

    #[test]
    fn single_and_list_values_are_encoded() {
        let mut e = event();
        e.query.insert("a".into(), QueryValue::Single("1".into()));
        e.query
            .insert("b".into(), QueryValue::Multi(vec!["x".into(), "y".into()]));
        let req = build_request(e, 9000, None).unwrap();
        let query = req.url.query().unwrap();
        assert_eq!(query.matches("a=1").count(), 1);
        assert_eq!(query.matches("b=").count(), 2);
        let bx = query.find("b=x").unwrap();
        let by = query.find("b=y").unwrap();
        assert!(bx < by);
    }

    #[test]
    fn reserved_characters_are_form_encoded() {
        let mut e = event();
        e.query
            .insert("q".into(), QueryValue::Single("a b&c=d".into()));
        let req = build_request(e, 9000, None).unwrap();
        assert_eq!(req.url.query(), Some("q=a+b%26c%3Dd"));
    }

    #[test]
    fn method_and_path_are_copied() {
        let mut e = event();
        e.method = "PATCH".into();
        e.path = "/a/b".into();
        let req = build_request(e, 8080, None).unwrap();
        assert_eq!(req.method, Method::PATCH);
        assert_eq!(req.url.path(), "/a/b");
        assert_eq!(req.url.port(), Some(8080));
        assert_eq!(req.url.host_str(), Some(HOST));
        assert_eq!(req.url.scheme(), "http");
    }

    #[test]
    fn dot_segments_in_path_are_resolved() {
        let cases = [
            ("/a/../b", "/b"),
            ("/a/./b", "/a/b"),
            ("/files/%2e%2e/secret", "/secret"),
            ("/a/b/", "/a/b/"),
            ("/with space", "/with%20space"),
        ];
        for (given, sent) in cases {
            let mut e = event();
            e.path = given.into();
            e.context.path = given.into();
            let req = build_request(e, 9000, None).unwrap();
            assert_eq!(req.url.path(), sent, "{}", given);
            assert_eq!(req.headers[HEADER_PATH], given);
        }
    }

    #[test]
    fn empty_method_defaults_to_get_and_path_gets_leading_slash() {
        let mut e = event();
        e.method.clear();
        e.path = "items".into();
        let req = build_request(e, 8080, None).unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.url.path(), "/items");
    }

    #[test]
    fn invalid_method_is_rejected() {
        let mut e = event();
        e.method = "GE T".into();
        let err = build_request(e, 8080, None).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidRequest(_)));
    }

    #[test]
    fn body_is_forwarded_verbatim() {
        let mut e = event();
        e.body = "aGVsbG8=".into();
        let req = build_request(e, 8080, None).unwrap();
        assert_eq!(req.body, b"aGVsbG8=");
    }

    #[test]
    fn metadata_headers_present_even_when_empty() {
        let req = build_request(event(), 9000, None).unwrap();
        for name in [
            HEADER_SERVICE_ID,
            HEADER_REQUEST_ID,
            HEADER_METHOD,
            HEADER_PATH,
            HEADER_SOURCE_IP,
            HEADER_FORWARDED_FOR,
            HEADER_STAGE,
        ] {
            let values: Vec<_> = req.headers.get_all(name).iter().collect();
            assert_eq!(values.len(), 1, "{}", name);
            assert_eq!(values[0], "", "{}", name);
        }
        assert!(req.headers.get(HEADER_SECRET_ID).is_none());
        assert!(req.headers.get(HEADER_SCF_REQUEST_ID).is_none());
    }

    #[test]
    fn metadata_headers_mirror_context() {
        let mut e = event();
        e.context = RequestContext {
            service_id: "service-1".into(),
            request_id: "req-1".into(),
            method: "GET".into(),
            path: "/hello".into(),
            source_ip: "10.1.2.3".into(),
            stage: "release".into(),
            identity: Identity {
                secret_id: Some("sk-123".into()),
            },
        };
        let req = build_request(e, 9000, Some("scf-42")).unwrap();
        assert_eq!(req.headers[HEADER_SERVICE_ID], "service-1");
        assert_eq!(req.headers[HEADER_REQUEST_ID], "req-1");
        assert_eq!(req.headers[HEADER_METHOD], "GET");
        assert_eq!(req.headers[HEADER_PATH], "/hello");
        assert_eq!(req.headers[HEADER_SOURCE_IP], "10.1.2.3");
        assert_eq!(req.headers[HEADER_FORWARDED_FOR], "10.1.2.3");
        assert_eq!(req.headers[HEADER_STAGE], "release");
        assert_eq!(req.headers[HEADER_SECRET_ID], "sk-123");
        assert_eq!(req.headers[HEADER_SCF_REQUEST_ID], "scf-42");
    }

    #[test]
    fn forwarded_headers_cannot_spoof_metadata() {
        let mut e = event();
        e.headers.insert("X-APIGateway-SecretId".into(), "forged".into());
        e.headers.insert("x-apigateway-stage".into(), "forged".into());
        e.headers.insert("X-Scf-RequestId".into(), "forged".into());
        e.context.stage = "test".into();
        let req = build_request(e, 9000, None).unwrap();
        assert!(req.headers.get(HEADER_SECRET_ID).is_none());
        assert!(req.headers.get(HEADER_SCF_REQUEST_ID).is_none());
        let stage: Vec<_> = req.headers.get_all(HEADER_STAGE).iter().collect();
        assert_eq!(stage, vec!["test"]);
    }

    #[test]
    fn event_headers_are_forwarded_except_transport_ones() {
        let mut e = event();
        e.headers.insert("Accept".into(), "application/json".into());
        e.headers.insert("Host".into(), "service.example.com".into());
        e.headers.insert("Content-Length".into(), "999".into());
        e.headers.insert("bad header".into(), "x".into());
        let req = build_request(e, 9000, None).unwrap();
        assert_eq!(req.headers["accept"], "application/json");
        assert!(req.headers.get("host").is_none());
        assert!(req.headers.get("content-length").is_none());
        assert_eq!(req.headers.len(), 8);
    }

    #[test]
    fn control_characters_are_stripped_from_metadata() {
        let mut e = event();
        e.context.stage = "re\nlease".into();
        e.context.service_id = "svc\r\x7f\t1".into();
        e.context.source_ip = "10.0.0.1\u{0}".into();
        e.context.path = "/caf\u{e9}".into();
        let req = build_request(e, 9000, None).unwrap();
        assert_eq!(req.headers[HEADER_STAGE], "release");
        assert_eq!(req.headers[HEADER_SERVICE_ID], "svc\t1");
        assert_eq!(req.headers[HEADER_SOURCE_IP], "10.0.0.1");
        assert_eq!(req.headers[HEADER_PATH].as_bytes(), "/caf\u{e9}".as_bytes());
    }

    #[test]
    fn binary_content_type_is_base64_encoded() {
        let payload: Vec<u8> = vec![0, 159, 146, 150, 255, 10];
        let registry = BinaryMimeRegistry::new(["application/octet-stream"]);
        let env = build_envelope(
            response(Some("application/octet-stream; charset=binary"), &payload),
            &registry,
        );
        assert!(env.is_base64_encoded);
        assert_eq!(env.body, STANDARD.encode(&payload));
        assert_eq!(STANDARD.decode(&env.body).unwrap(), payload);
    }

    #[test]
    fn text_content_type_is_copied() {
        let env = build_envelope(
            response(Some("text/plain"), b"hello world"),
            &BinaryMimeRegistry::default(),
        );
        assert!(!env.is_base64_encoded);
        assert_eq!(env.body, "hello world");
        assert_eq!(env.status_code, 200);
        assert_eq!(env.headers["content-type"], "text/plain");
    }

    #[test]
    fn missing_content_type_is_text() {
        let registry = BinaryMimeRegistry::new(["application/octet-stream"]);
        let env = build_envelope(response(None, b"plain"), &registry);
        assert!(!env.is_base64_encoded);
        assert_eq!(env.body, "plain");
    }

    #[test]
    fn unregistered_binary_payload_is_lossy_text() {
        let env = build_envelope(
            response(Some("image/png"), &[b'o', b'k', 0xff]),
            &BinaryMimeRegistry::default(),
        );
        assert!(!env.is_base64_encoded);
        assert_eq!(env.body, "ok\u{fffd}");
    }

    #[test]
    fn repeated_headers_keep_first_value() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        let env = build_envelope(
            TransportResponse {
                status: StatusCode::CREATED,
                headers,
                body: Vec::new(),
            },
            &BinaryMimeRegistry::default(),
        );
        assert_eq!(env.status_code, 201);
        assert_eq!(env.headers.len(), 1);
        assert_eq!(env.headers["set-cookie"], "a=1");
        assert_eq!(env.body, "");
    }
}
