//! Per-request configuration shared by both clients
//!
//! Cookie policy plus the two timeouts that apply to every request:
//! how long to wait for a connection slot and how long to wait for the
//! response once sent.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Default wait for a connection slot
pub const DEFAULT_CONNECTION_REQUEST_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Cookie handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CookiePolicy {
    /// RFC 6265 cookie store shared by both clients
    Strict,
    /// Cookies are neither stored nor sent
    Ignore,
}

/// Request configuration applied to every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    pub cookie_policy: CookiePolicy,
    /// Maximum wait for a connection slot from the connection manager
    pub connection_request_timeout: Duration,
    /// Maximum wait for the response once the request is sent;
    /// `None` waits indefinitely
    pub response_timeout: Option<Duration>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            cookie_policy: CookiePolicy::Strict,
            connection_request_timeout: DEFAULT_CONNECTION_REQUEST_TIMEOUT,
            response_timeout: None,
        }
    }
}

impl RequestConfig {
    /// Build from optional overrides, falling back to defaults
    pub fn new(connection_request_timeout: Option<Duration>, response_timeout: Option<Duration>) -> Self {
        Self {
            connection_request_timeout: connection_request_timeout
                .unwrap_or(DEFAULT_CONNECTION_REQUEST_TIMEOUT),
            response_timeout,
            ..Default::default()
        }
    }

    /// Apply the response timeout to an outgoing request
    pub(crate) fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.response_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_config_defaults() {
        let config = RequestConfig::default();
        assert_eq!(config.cookie_policy, CookiePolicy::Strict);
        assert_eq!(config.connection_request_timeout, Duration::from_secs(180));
        assert_eq!(config.response_timeout, None);
    }

    #[test]
    fn test_request_config_overrides() {
        let config = RequestConfig::new(Some(Duration::from_millis(500)), Some(Duration::from_secs(2)));
        assert_eq!(config.cookie_policy, CookiePolicy::Strict);
        assert_eq!(config.connection_request_timeout, Duration::from_millis(500));
        assert_eq!(config.response_timeout, Some(Duration::from_secs(2)));

        let config = RequestConfig::new(None, None);
        assert_eq!(config.connection_request_timeout, DEFAULT_CONNECTION_REQUEST_TIMEOUT);
    }
}
