//! Shared transport under both clients
//!
//! One `reqwest::Client` (connection pool, proxy, credentials, cookie store)
//! plus the connection manager, request configuration and retry strategy.
//! Sends a request, retries transport failures the strategy accepts, and
//! reads the full body before releasing the connection lease.

use std::sync::Arc;

use crate::error::TransportFailure;
use crate::http::connection::ConnectionManager;
use crate::http::proxy::CredentialContext;
use crate::http::request::Request;
use crate::http::response::RawResponse;
use crate::http::retry::RetryStrategy;
use crate::http::timeout::{CookiePolicy, RequestConfig};
use crate::{Error, Result};

#[derive(Debug)]
pub struct Transport {
    client: reqwest::Client,
    connections: ConnectionManager,
    credentials: CredentialContext,
    request_config: RequestConfig,
    retry: Arc<dyn RetryStrategy>,
}

impl Transport {
    pub fn new(
        connections: ConnectionManager,
        credentials: CredentialContext,
        request_config: RequestConfig,
        retry: Arc<dyn RetryStrategy>,
    ) -> Result<Self> {
        // Callers need the raw bytes and length, so no transparent decompression
        let builder = reqwest::Client::builder()
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .cookie_store(request_config.cookie_policy == CookiePolicy::Strict);
        let builder = connections.configure(builder);
        let builder = credentials.configure(builder)?;

        let client = builder.build().map_err(|e| Error::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(e.into()),
        })?;

        Ok(Self {
            client,
            connections,
            credentials,
            request_config,
            retry,
        })
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn credentials(&self) -> &CredentialContext {
        &self.credentials
    }

    pub fn request_config(&self) -> &RequestConfig {
        &self.request_config
    }

    /// Send with retries; the connection lease is held until the body is read
    /// and dropped on every exit path
    pub async fn send(&self, request: &Request) -> Result<RawResponse> {
        let _lease = self
            .connections
            .acquire(self.request_config.connection_request_timeout)
            .await?;

        let mut exec_count = 0;
        loop {
            exec_count += 1;
            match self.send_once(request).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    let failure = TransportFailure::from_reqwest(&error);
                    if !self.retry.retry_request(request, &failure, exec_count) {
                        return Err(Error::from_reqwest(error));
                    }
                    let delay = self.retry.retry_interval(request, exec_count);
                    tracing::warn!(
                        attempt = exec_count,
                        ?delay,
                        %failure,
                        error = %error,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn send_once(&self, request: &Request) -> std::result::Result<RawResponse, reqwest::Error> {
        let mut builder = self
            .client
            .request(request.verb().as_method(), request.uri().clone())
            .headers(request.wire_headers());
        if let Some(body) = request.body() {
            builder = builder.body(body.payload().clone());
        }
        let builder = self.request_config.apply(builder);

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(RawResponse::new(status, headers, body))
    }
}
