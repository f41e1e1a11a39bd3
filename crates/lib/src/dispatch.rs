//! Dispatcher: sends translated events to the co-located HTTP server.
//!
//! One `Dispatcher` is shared by every invocation. It holds no per-call state, so `handle`
//! may run concurrently from any number of tasks.

use crate::error::{AdapterError, HandleError};
use crate::event::{InvocationEvent, ResponseEnvelope};
use crate::mime::BinaryMimeRegistry;
use crate::translate::{self, TransportResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-invocation context supplied by the function runtime.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    /// The runtime's own request id. Forwarded as `x-scf-requestid` when set.
    pub request_id: Option<String>,
    /// Point after which the transport call is abandoned.
    pub deadline: Option<Instant>,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Time left before the deadline; zero once it has passed.
    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Forwards gateway events to `http://127.0.0.1:{port}` and returns gateway envelopes.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    port: u16,
    binary_mime_types: Arc<BinaryMimeRegistry>,
}

impl Dispatcher {
    /// Dispatcher for the server on `port` with a default client and no binary types.
    pub fn new(port: u16) -> Self {
        Self {
            client: default_client(),
            port,
            binary_mime_types: Arc::new(BinaryMimeRegistry::default()),
        }
    }

    /// Replace the transport client (timeouts, redirect policy, connection pool).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Response content types to base64-encode in the envelope.
    pub fn with_binary_mime_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.binary_mime_types = Arc::new(BinaryMimeRegistry::new(types));
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn binary_mime_types(&self) -> &BinaryMimeRegistry {
        &self.binary_mime_types
    }

    /// Forward one event and translate the response.
    ///
    /// On failure the error carries a 500 envelope with an empty body alongside the cause.
    /// Dropping the returned future cancels the in-flight request.
    pub async fn handle(
        &self,
        ctx: &InvocationContext,
        event: InvocationEvent,
    ) -> Result<ResponseEnvelope, HandleError> {
        self.dispatch(ctx, event).await.map_err(|e| {
            log::error!("{}", e);
            HandleError::from(e)
        })
    }

    async fn dispatch(
        &self,
        ctx: &InvocationContext,
        event: InvocationEvent,
    ) -> Result<ResponseEnvelope, AdapterError> {
        let req = translate::build_request(event, self.port, ctx.request_id.as_deref())?;
        log::debug!("forwarding {} {}", req.method, req.url);

        let mut builder = self
            .client
            .request(req.method, req.url)
            .headers(req.headers)
            .body(req.body);
        if let Some(remaining) = ctx.remaining() {
            builder = builder.timeout(remaining);
        }
        let res = builder.send().await.map_err(AdapterError::Transport)?;

        let status = res.status();
        let headers = res.headers().clone();
        let body = res.bytes().await.map_err(AdapterError::BodyRead)?;
        log::debug!("target responded {} ({} bytes)", status, body.len());

        Ok(translate::build_envelope(
            TransportResponse {
                status,
                headers,
                body: body.to_vec(),
            },
            &self.binary_mime_types,
        ))
    }
}

/// Client used when none is supplied. Proxy settings from the environment are ignored since
/// the target is always on loopback.
fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap_or_else(|e| {
            log::warn!("building default http client failed, using reqwest defaults: {}", e);
            reqwest::Client::new()
        })
}
