//! HTTP access layer for the Web API
//!
//! This module provides:
//! - A request model with one parameterised verb
//! - Pooled or single-connection transport with proxy credentials
//! - Retry of dropped sends with exponential backoff
//! - A private response cache for GET requests
//! - Classification of responses into a body or a typed error
//! - Blocking and cancellable asynchronous execution on a worker runtime

pub mod cache;
pub mod cache_policy;
pub mod classifier;
pub mod client;
pub mod config;
pub mod connection;
pub mod manager;
pub mod proxy;
pub mod request;
pub mod response;
pub mod retry;
pub mod timeout;
pub mod transport;
pub mod worker;

pub use cache::{CacheConfig, CacheOutcome, ResponseCache};
pub use classifier::classify;
pub use client::{CachingClient, Exchange, HttpClient, PlainClient};
pub use config::{HttpManagerBuilder, HttpManagerConfig};
pub use connection::{ConnectionManager, ConnectionStrategy};
pub use manager::{HttpManager, RequestExecutor};
pub use proxy::{AuthScope, CredentialContext, ProxyCredentials, ProxyHost};
pub use request::{make_uri, Body, Request, Verb};
pub use response::{parse_body, RawResponse};
pub use retry::{DefaultRetryStrategy, RetryPolicy, RetryStrategy};
pub use timeout::{CookiePolicy, RequestConfig};
pub use transport::Transport;
pub use worker::PendingResponse;

// Re-export commonly used types
pub use reqwest::header::{HeaderMap, HeaderValue};
pub use reqwest::StatusCode;
pub use url::Url;
