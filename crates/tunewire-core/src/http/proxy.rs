//! Proxy routing and proxy credentials
//!
//! Credentials are registered against the exact scheme, host and port of the
//! configured proxy and are presented to nothing else.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyHost {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl ProxyHost {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Parse `scheme://host[:port]`; a missing port takes the scheme default
    pub fn parse(value: &str) -> Result<Self> {
        let url = Url::parse(value).map_err(|e| Error::Configuration {
            message: format!("invalid proxy address \"{}\"", value),
            source: Some(e.into()),
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::configuration(format!("proxy address \"{}\" has no host", value)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::configuration(format!("proxy address \"{}\" has no port", value)))?;
        Ok(Self::new(url.scheme(), host, port))
    }

    pub fn to_url_string(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for ProxyHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_url_string())
    }
}

/// Username/password presented to the proxy
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl ProxyCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where a set of credentials applies: one scheme+host+port, any realm,
/// any auth scheme
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthScope {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl From<&ProxyHost> for AuthScope {
    fn from(proxy: &ProxyHost) -> Self {
        Self {
            scheme: proxy.scheme.to_ascii_lowercase(),
            host: proxy.host.to_ascii_lowercase(),
            port: proxy.port,
        }
    }
}

/// Proxy route plus the credentials scoped to it, shared by both clients
#[derive(Debug, Clone, Default)]
pub struct CredentialContext {
    proxy: Option<ProxyHost>,
    credentials: HashMap<AuthScope, ProxyCredentials>,
}

impl CredentialContext {
    pub fn new(proxy: Option<ProxyHost>, credentials: Option<ProxyCredentials>) -> Self {
        let mut store = HashMap::new();
        if let (Some(proxy), Some(credentials)) = (&proxy, credentials) {
            store.insert(AuthScope::from(proxy), credentials);
        }
        Self {
            proxy,
            credentials: store,
        }
    }

    pub fn proxy(&self) -> Option<&ProxyHost> {
        self.proxy.as_ref()
    }

    /// Credentials registered for exactly this scope
    pub fn credentials_for(&self, scope: &AuthScope) -> Option<&ProxyCredentials> {
        self.credentials.get(scope)
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Route the client through the proxy, or go direct
    pub(crate) fn configure(&self, builder: reqwest::ClientBuilder) -> Result<reqwest::ClientBuilder> {
        let Some(proxy) = &self.proxy else {
            return Ok(builder.no_proxy());
        };

        let mut route = reqwest::Proxy::all(proxy.to_url_string()).map_err(|e| Error::Configuration {
            message: format!("invalid proxy {}", proxy),
            source: Some(e.into()),
        })?;
        if let Some(credentials) = self.credentials_for(&AuthScope::from(proxy)) {
            route = route.basic_auth(&credentials.username, &credentials.password);
        }
        tracing::debug!(proxy = %proxy, "routing requests through proxy");
        Ok(builder.proxy(route))
    }
}
