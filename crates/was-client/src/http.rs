//! [`HttpTransport`] over `reqwest`, and the service-level app listing.

use std::collections::BTreeMap;
use std::future::Future;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use url::Url;
use was_core::backend::{BackendError, Operation, parse_body};
use was_core::protocol::AppInfo;
use was_core::transport::{HttpTransport, Method, RawResponse, TransportError};

use crate::ClientError;

/// Sends data-API requests relative to one base URL.
///
/// The base always ends in `/`, so `game-invites/bob` resolves under it
/// instead of replacing its last segment.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base: Url,
}

impl ReqwestTransport {
    /// Transport for `base`, e.g. `http://localhost:8080/data/Golf_distance`.
    pub fn new(base: &str) -> Result<Self, ClientError> {
        Ok(Self::with_client(Client::new(), parse_base(base)?))
    }

    /// Share an existing connection pool.
    pub fn with_client(client: Client, mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { client, base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn prepare(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RequestBuilder, TransportError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| TransportError::Io(format!("bad request path '{path}': {e}")))?;
        let builder = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Delete => self.client.delete(url),
        };
        Ok(match body {
            Some(body) => builder.json(body),
            None => builder,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send {
        let prepared = self.prepare(method, path, body);
        let path = path.to_string();
        async move {
            let response = prepared?
                .send()
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            tracing::debug!(%method, path = %path, status, "Data API response");
            Ok(RawResponse::new(status, body))
        }
    }
}

fn parse_base(url: &str) -> Result<Url, ClientError> {
    Url::parse(url).map_err(|source| ClientError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Service listing
// ---------------------------------------------------------------------------

/// `GET {origin}/service/apps`: the applications the server hosts, keyed by
/// directory.
pub async fn list_apps(origin: &str) -> Result<BTreeMap<String, AppInfo>, ClientError> {
    let service = ReqwestTransport::new(&format!("{}/service", origin.trim_end_matches('/')))?;
    let path = "apps";
    let response = service
        .request(Method::Get, path, None)
        .await
        .map_err(BackendError::from)?;
    if !response.is_success() {
        return Err(BackendError::Request {
            op: Operation::ListApps,
            path: path.to_string(),
            status: response.status,
        }
        .into());
    }
    Ok(parse_body(Operation::ListApps, path, &response)?)
}
