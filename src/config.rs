use std::time::Duration;

use serde::Deserialize;

pub(crate) const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Client settings, shared by the engine and the transport.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cap on the accumulated response body. Unbounded when unset.
    pub max_response_size: Option<usize>,
    pub user_agent: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    /// Whole-transfer timeout, enforced by the transport.
    pub timeout_ms: Option<u64>,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    pub proxy: Option<String>,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_response_size: None,
            user_agent: None,
            connect_timeout_ms: None,
            timeout_ms: None,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            proxy: None,
            verbose: false,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_slice(json: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(json)?)
    }

    #[inline]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// The configured user agent, or `eventloop-http/<version>`.
    pub fn user_agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .unwrap_or(concat!("eventloop-http/", env!("CARGO_PKG_VERSION")))
    }
}
