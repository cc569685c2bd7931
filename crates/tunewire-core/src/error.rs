//! Error types for the Tunewire core library
//!
//! Every failure a caller can observe is one variant of [`Error`]: the
//! status-derived Web API errors produced by the response classifier,
//! transport I/O failures, URI and response parsing failures, configuration
//! problems, and cancellation of an asynchronous request.

use std::fmt;
use thiserror::Error;
use serde::{Deserialize, Serialize};

/// Main error type for Tunewire operations
#[derive(Error, Debug)]
pub enum Error {
    /// 400 Bad Request
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// 401 Unauthorized
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// 403 Forbidden
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// 404 Not Found
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// 429 Too Many Requests, with the server's `Retry-After` hint in seconds
    #[error("Too many requests: {message}")]
    TooManyRequests {
        message: String,
        retry_after: Option<u64>,
    },

    /// 500 Internal Server Error
    #[error("Internal server error: {message}")]
    InternalServerError { message: String },

    /// 502 Bad Gateway
    #[error("Bad gateway: {message}")]
    BadGateway { message: String },

    /// 503 Service Unavailable
    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// Any other Web API failure raised by a collaborator for a status the
    /// classifier does not enumerate
    #[error("Web API error [{status}]: {message}")]
    WebApi { status: u16, message: String },

    /// Transport-level failure: no usable response was received
    #[error("I/O error ({failure}): {message}")]
    Io {
        message: String,
        failure: TransportFailure,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A URI string could not be parsed
    #[error("URI syntax error for \"{uri}\": {source}")]
    UriSyntax {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// A response body could not be decoded
    #[error("Failed to parse response: {message}")]
    ResponseParse {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Invalid configuration or a failure while constructing the manager
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// An asynchronous request was cancelled before its result was delivered
    #[error("Request cancelled before completion")]
    Cancelled,

    /// Generic internal error with context
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of transport failure behind an [`Error::Io`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportFailure {
    /// TCP/TLS connection could not be established
    Connect,
    /// Connect or response timeout expired
    Timeout,
    /// No connection slot became free within the connection-request timeout
    ConnectionRequestTimeout,
    /// The request was sent but the connection dropped before a response
    Send,
    /// The response body could not be read
    Body,
    /// The request could not be assembled by the HTTP stack
    Builder,
    /// Anything the HTTP stack does not classify further
    Other,
}

impl TransportFailure {
    /// Classify a reqwest error
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_builder() {
            TransportFailure::Builder
        } else if error.is_timeout() {
            TransportFailure::Timeout
        } else if error.is_connect() {
            TransportFailure::Connect
        } else if error.is_body() || error.is_decode() {
            TransportFailure::Body
        } else if error.is_request() {
            TransportFailure::Send
        } else {
            TransportFailure::Other
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailure::Connect => write!(f, "connect"),
            TransportFailure::Timeout => write!(f, "timeout"),
            TransportFailure::ConnectionRequestTimeout => write!(f, "connection request timeout"),
            TransportFailure::Send => write!(f, "send"),
            TransportFailure::Body => write!(f, "body"),
            TransportFailure::Builder => write!(f, "builder"),
            TransportFailure::Other => write!(f, "other"),
        }
    }
}

impl Error {
    /// Generic Web API error for a status the classifier does not enumerate
    pub fn web_api(status: u16, message: impl Into<String>) -> Self {
        Error::WebApi {
            status,
            message: message.into(),
        }
    }

    /// Wrap a reqwest failure
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        Error::Io {
            message: error.to_string(),
            failure: TransportFailure::from_reqwest(&error),
            source: Some(error),
        }
    }

    /// HTTP status code for status-derived errors
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::BadRequest { .. } => Some(400),
            Error::Unauthorized { .. } => Some(401),
            Error::Forbidden { .. } => Some(403),
            Error::NotFound { .. } => Some(404),
            Error::TooManyRequests { .. } => Some(429),
            Error::InternalServerError { .. } => Some(500),
            Error::BadGateway { .. } => Some(502),
            Error::ServiceUnavailable { .. } => Some(503),
            Error::WebApi { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Seconds to wait before retrying, only set for 429 responses
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::TooManyRequests { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Message carried by status-derived errors
    pub fn api_message(&self) -> Option<&str> {
        match self {
            Error::BadRequest { message }
            | Error::Unauthorized { message }
            | Error::Forbidden { message }
            | Error::NotFound { message }
            | Error::TooManyRequests { message, .. }
            | Error::InternalServerError { message }
            | Error::BadGateway { message }
            | Error::ServiceUnavailable { message }
            | Error::WebApi { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether this error was produced from an HTTP status code
    pub fn is_web_api_error(&self) -> bool {
        self.status_code().is_some()
    }

    /// Whether the request was cancelled before completion
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            source: None,
        }
    }
}
