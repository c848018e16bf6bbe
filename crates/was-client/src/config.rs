//! Client configuration from the environment.

use std::time::Duration;

use was_core::polling::DEFAULT_POLL_INTERVAL;

pub const DEFAULT_ORIGIN: &str = "http://localhost:8080";
pub const DEFAULT_APP: &str = "Golf_distance";

/// Where the data API lives and how often to poll it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Scheme, host and port of the server, without a trailing slash.
    pub origin: String,
    /// Application directory under `/data/`.
    pub app: String,
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            app: DEFAULT_APP.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Read `WAS_ORIGIN`, `WAS_APP` and `WAS_POLL_MS`, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let origin = lookup("WAS_ORIGIN")
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.origin);
        let app = lookup("WAS_APP")
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.app);
        let poll_interval = lookup("WAS_POLL_MS")
            .and_then(|ms| ms.parse::<u64>().ok())
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        Self {
            origin,
            app,
            poll_interval,
        }
    }

    /// `{origin}/data/{app}`: the base every data-API path is relative to.
    pub fn data_url(&self) -> String {
        format!("{}/data/{}", self.origin.trim_end_matches('/'), self.app)
    }

    /// The page URL whose query string carries the session parameters.
    pub fn page_url(&self) -> String {
        format!("{}/{}/", self.origin.trim_end_matches('/'), self.app)
    }
}
