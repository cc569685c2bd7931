//! Manager configuration and its builder
//!
//! [`HttpManagerBuilder`] collects optional settings; defaults are applied
//! when the manager is built. Environment variables can override any
//! setting through [`HttpManagerBuilder::merge_env`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::cache::CacheConfig;
use crate::http::manager::HttpManager;
use crate::http::proxy::{ProxyCredentials, ProxyHost};
use crate::http::retry::{DefaultRetryStrategy, RetryStrategy};
use crate::http::timeout::{CookiePolicy, RequestConfig};
use crate::{Error, Result};

/// Worker threads used when none are configured
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Environment variable prefix for [`HttpManagerBuilder::merge_env`]
pub const ENV_PREFIX: &str = "TUNEWIRE_";

/// Immutable manager configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpManagerConfig {
    pub proxy: Option<ProxyHost>,
    pub proxy_credentials: Option<ProxyCredentials>,
    pub cache_max_entries: Option<usize>,
    pub cache_max_object_size: Option<usize>,
    pub connection_request_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub socket_timeout: Option<Duration>,
    pub use_pooling_connection_manager: bool,
    pub cookie_policy: Option<CookiePolicy>,
    pub worker_threads: Option<usize>,
}

impl HttpManagerConfig {
    /// Effective cache bounds
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from_overrides(self.cache_max_entries, self.cache_max_object_size)
    }

    /// Effective request configuration
    pub fn request_config(&self) -> RequestConfig {
        let mut config = RequestConfig::new(self.connection_request_timeout, self.socket_timeout);
        if let Some(policy) = self.cookie_policy {
            config.cookie_policy = policy;
        }
        config
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or(DEFAULT_WORKER_THREADS)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match (&self.proxy, &self.proxy_credentials) {
            (None, Some(_)) => {
                return Err(Error::configuration(
                    "proxy credentials are set but no proxy is configured",
                ))
            }
            (Some(proxy), None) => {
                return Err(Error::configuration(format!(
                    "proxy {} is configured without proxy credentials",
                    proxy
                )))
            }
            _ => {}
        }

        for (name, timeout) in [
            ("connection request timeout", self.connection_request_timeout),
            ("connect timeout", self.connect_timeout),
            ("socket timeout", self.socket_timeout),
        ] {
            if timeout.is_some_and(|t| t.is_zero()) {
                return Err(Error::configuration(format!("{} cannot be zero", name)));
            }
        }

        if self.worker_threads == Some(0) {
            return Err(Error::configuration("worker threads must be at least 1"));
        }

        Ok(())
    }
}

/// Builder for [`HttpManager`]
#[derive(Debug, Clone, Default)]
pub struct HttpManagerBuilder {
    config: HttpManagerConfig,
    retry_strategy: Option<Arc<dyn RetryStrategy>>,
    log_dispatch: Option<tracing::Dispatch>,
}

impl HttpManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one deserialized from a file
    pub fn from_config(config: HttpManagerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Route all traffic through this proxy
    pub fn proxy(mut self, proxy: ProxyHost) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    /// Basic credentials presented to the proxy
    pub fn proxy_credentials(mut self, credentials: ProxyCredentials) -> Self {
        self.config.proxy_credentials = Some(credentials);
        self
    }

    pub fn cache_max_entries(mut self, entries: usize) -> Self {
        self.config.cache_max_entries = Some(entries);
        self
    }

    pub fn cache_max_object_size(mut self, bytes: usize) -> Self {
        self.config.cache_max_object_size = Some(bytes);
        self
    }

    /// Maximum wait for a connection slot
    pub fn connection_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_request_timeout = Some(timeout);
        self
    }

    /// Maximum wait to establish TCP/TLS
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Maximum wait for a response once sent
    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.config.socket_timeout = Some(timeout);
        self
    }

    /// Use a pool of reusable connections instead of a single connection
    pub fn pooling_connection_manager(mut self) -> Self {
        self.config.use_pooling_connection_manager = true;
        self
    }

    pub fn cookie_policy(mut self, policy: CookiePolicy) -> Self {
        self.config.cookie_policy = Some(policy);
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = Some(threads);
        self
    }

    /// Replace the default retry strategy
    pub fn retry_strategy(mut self, strategy: Arc<dyn RetryStrategy>) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    /// Dispatcher receiving the manager's log events. Defaults to the one
    /// current when [`build`](Self::build) is called.
    pub fn log_dispatch(mut self, dispatch: tracing::Dispatch) -> Self {
        self.log_dispatch = Some(dispatch);
        self
    }

    /// Apply `TUNEWIRE_*` environment overrides
    pub fn merge_env(self) -> Result<Self> {
        self.merge_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, keyed by full variable name
    pub fn merge_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));

        if let Some(proxy) = var("PROXY") {
            self.config.proxy = Some(ProxyHost::parse(&proxy)?);
        }
        match (var("PROXY_USERNAME"), var("PROXY_PASSWORD")) {
            (Some(username), Some(password)) => {
                self.config.proxy_credentials = Some(ProxyCredentials::new(username, password));
            }
            (None, None) => {}
            _ => {
                return Err(Error::configuration(format!(
                    "{0}PROXY_USERNAME and {0}PROXY_PASSWORD must be set together",
                    ENV_PREFIX
                )))
            }
        }
        if let Some(value) = var("CACHE_MAX_ENTRIES") {
            self.config.cache_max_entries = Some(parse_var("CACHE_MAX_ENTRIES", &value)?);
        }
        if let Some(value) = var("CACHE_MAX_OBJECT_SIZE") {
            self.config.cache_max_object_size = Some(parse_var("CACHE_MAX_OBJECT_SIZE", &value)?);
        }
        if let Some(value) = var("CONNECTION_REQUEST_TIMEOUT_MS") {
            self.config.connection_request_timeout =
                Some(Duration::from_millis(parse_var("CONNECTION_REQUEST_TIMEOUT_MS", &value)?));
        }
        if let Some(value) = var("CONNECT_TIMEOUT_MS") {
            self.config.connect_timeout =
                Some(Duration::from_millis(parse_var("CONNECT_TIMEOUT_MS", &value)?));
        }
        if let Some(value) = var("SOCKET_TIMEOUT_MS") {
            self.config.socket_timeout =
                Some(Duration::from_millis(parse_var("SOCKET_TIMEOUT_MS", &value)?));
        }
        if let Some(value) = var("POOLED") {
            self.config.use_pooling_connection_manager = match value.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(Error::configuration(format!(
                        "{}POOLED must be true or false, got \"{}\"",
                        ENV_PREFIX, value
                    )))
                }
            };
        }

        Ok(self)
    }

    pub fn config(&self) -> &HttpManagerConfig {
        &self.config
    }

    /// Construct the manager
    pub fn build(self) -> Result<HttpManager> {
        self.config.validate()?;
        let retry = self
            .retry_strategy
            .unwrap_or_else(|| Arc::new(DefaultRetryStrategy::default()));
        let dispatch = self
            .log_dispatch
            .unwrap_or_else(|| tracing::dispatcher::get_default(|current| current.clone()));
        HttpManager::from_parts(self.config, retry, dispatch)
    }
}

fn parse_var<T: std::str::FromStr>(suffix: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse().map_err(|e: T::Err| Error::Configuration {
        message: format!("invalid value \"{}\" for {}{}", value, ENV_PREFIX, suffix),
        source: Some(e.into()),
    })
}
