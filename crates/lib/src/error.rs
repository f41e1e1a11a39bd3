//! Error types for translation and dispatch.

use crate::event::ResponseEnvelope;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Sending the request failed: connection refused, timeout, protocol error.
    #[error("send http request failed: {0}")]
    Transport(#[source] reqwest::Error),
    /// The response arrived but its body could not be read to the end.
    #[error("read http response body failed: {0}")]
    BodyRead(#[source] reqwest::Error),
    /// The event cannot be expressed as an HTTP request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid event: {0}")]
    Event(#[from] serde_json::Error),
}

/// Failure from [`crate::Dispatcher::handle`].
///
/// Carries the envelope to emit anyway (status 500, empty body) next to the cause, so the
/// gateway runtime always has a well-formed response.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct HandleError {
    pub envelope: ResponseEnvelope,
    #[source]
    pub error: AdapterError,
}

impl From<AdapterError> for HandleError {
    fn from(error: AdapterError) -> Self {
        Self {
            envelope: ResponseEnvelope::internal_error(),
            error,
        }
    }
}
