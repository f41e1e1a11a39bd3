//! apigw-bridge — drive an ordinary HTTP server from API gateway trigger events.
//!
//! The gateway runtime hands each invocation event to a [`Dispatcher`], which translates it
//! into an HTTP request against a server on `127.0.0.1`, sends it, and translates the
//! response into the envelope the gateway expects.
//!
//! ```text
//! gateway runtime
//!   │  InvocationEvent
//!   ▼
//! Dispatcher::handle
//!   ├── translate::build_request   (event → HTTP request)
//!   ├── reqwest → 127.0.0.1:{port}
//!   ├── translate::build_envelope  (HTTP response → envelope)
//!   ▼
//! ResponseEnvelope
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod mime;
pub mod translate;

pub use dispatch::{Dispatcher, InvocationContext};
pub use error::{AdapterError, HandleError};
pub use event::{Identity, InvocationEvent, QueryValue, RequestContext, ResponseEnvelope};
pub use mime::BinaryMimeRegistry;
