//! Request model handed to the HTTP manager
//!
//! A [`Request`] is built fresh for every call by a per-endpoint builder and
//! consumed by the manager.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, PROXY_AUTHORIZATION};
use reqwest::Method;
use url::Url;

use crate::{Error, Result};

/// HTTP verbs the Web API uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    /// Whether repeating the request has the same effect as sending it once
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Verb::Post)
    }

    /// Whether responses to this verb may be served from the cache
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Verb::Get)
    }

    pub fn as_method(&self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Delete => Method::DELETE,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Get => write!(f, "GET"),
            Verb::Post => write!(f, "POST"),
            Verb::Put => write!(f, "PUT"),
            Verb::Delete => write!(f, "DELETE"),
        }
    }
}

/// Request entity: payload plus its content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    content_type: Option<HeaderValue>,
    payload: Bytes,
}

impl Body {
    pub fn new(content_type: Option<HeaderValue>, payload: impl Into<Bytes>) -> Self {
        Self {
            content_type,
            payload: payload.into(),
        }
    }

    /// `application/json` entity
    pub fn json(payload: impl Into<Bytes>) -> Self {
        Self::new(Some(HeaderValue::from_static("application/json")), payload)
    }

    /// `application/x-www-form-urlencoded` entity
    pub fn form(payload: impl Into<Bytes>) -> Self {
        Self::new(
            Some(HeaderValue::from_static("application/x-www-form-urlencoded")),
            payload,
        )
    }

    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A single HTTP request
#[derive(Debug, Clone)]
pub struct Request {
    verb: Verb,
    uri: Url,
    headers: HeaderMap,
    body: Option<Body>,
    idempotent: bool,
}

impl Request {
    pub fn new(verb: Verb, uri: Url) -> Self {
        Self {
            verb,
            uri,
            headers: HeaderMap::new(),
            body: None,
            idempotent: verb.is_idempotent(),
        }
    }

    pub fn get(uri: Url) -> Self {
        Self::new(Verb::Get, uri)
    }

    pub fn post(uri: Url) -> Self {
        Self::new(Verb::Post, uri)
    }

    pub fn put(uri: Url) -> Self {
        Self::new(Verb::Put, uri)
    }

    pub fn delete(uri: Url) -> Self {
        Self::new(Verb::Delete, uri)
    }

    /// Replace the header set; headers are sent exactly as given
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Attach an entity. Ignored for GET.
    pub fn with_body(mut self, body: Option<Body>) -> Self {
        self.body = body;
        self
    }

    /// Mark a POST as safe to resend after a transport failure.
    /// GET/PUT/DELETE are always idempotent.
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = self.verb.is_idempotent() || idempotent;
        self
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Body> {
        match self.verb {
            Verb::Get => None,
            _ => self.body.as_ref(),
        }
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    /// Headers as they go on the wire: the caller's set, plus the entity's
    /// content type when the caller did not supply one
    pub(crate) fn wire_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        if let Some(content_type) = self.body().and_then(Body::content_type) {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, content_type.clone());
            }
        }
        headers
    }

    /// Header names and values for logging, credentials masked
    pub(crate) fn redacted_headers(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(name, value)| {
                let shown = if name == AUTHORIZATION || name == PROXY_AUTHORIZATION {
                    "<redacted>".to_string()
                } else {
                    value.to_str().unwrap_or("<binary>").to_string()
                };
                (name.as_str().to_string(), shown)
            })
            .collect()
    }
}

/// Parse a URI string.
///
/// Failures are logged and returned as [`Error::UriSyntax`].
pub fn make_uri(uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|source| {
        tracing::error!(uri, error = %source, "URI syntax error");
        Error::UriSyntax {
            uri: uri.to_string(),
            source,
        }
    })
}
