//! Transport abstraction for the data API.
//!
//! Decouples the [`BackendClient`](crate::backend::BackendClient) from any
//! specific HTTP stack. A transport issues exactly one request and reports the
//! raw status and body; classifying the outcome is the backend client's job.

use std::fmt;
use std::future::Future;

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur before a response status is available.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS, TLS or timeout failure.
    #[error("{0}")]
    Io(String),
}

/// The HTTP methods the data API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues single requests against the application's data base URL.
///
/// `path` is relative to the base (e.g. `game-invites/bob`). Implementations
/// must not retry; a non-2xx status is a normal `Ok` result.
pub trait HttpTransport {
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}
