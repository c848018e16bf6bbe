//! Native adapters for the `was-core` handshake: an HTTP transport over
//! `reqwest`, a query-string parameter store, and environment configuration.

pub mod config;
pub mod http;
pub mod url_params;

use thiserror::Error;
use was_core::backend::BackendError;

/// Errors raised while setting up or using the native client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub use config::ClientConfig;
pub use http::{ReqwestTransport, list_apps};
pub use url_params::UrlParams;
