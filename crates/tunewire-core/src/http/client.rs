//! The two clients behind the manager
//!
//! [`CachingClient`] answers GET requests from a private response cache when
//! it can; [`PlainClient`] always goes upstream and is the only client used
//! for POST, PUT and DELETE. Both share one [`Transport`].

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use reqwest::StatusCode;

use crate::http::cache::{CacheConfig, CacheOutcome, CachedResponse, ResponseCache};
use crate::http::cache_policy::{self, CacheControl};
use crate::http::request::Request;
use crate::http::response::RawResponse;
use crate::http::transport::Transport;
use crate::Result;

/// A response together with how it was produced
#[derive(Debug, Clone)]
pub struct Exchange {
    pub response: RawResponse,
    pub cache_outcome: CacheOutcome,
}

/// A client the manager dispatches requests to
pub trait HttpClient: Send + Sync {
    fn execute(&self, request: &Request) -> impl Future<Output = Result<Exchange>> + Send;
}

/// Sends every request upstream
#[derive(Debug, Clone)]
pub struct PlainClient {
    transport: Arc<Transport>,
}

impl PlainClient {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

impl HttpClient for PlainClient {
    async fn execute(&self, request: &Request) -> Result<Exchange> {
        let response = self.transport.send(request).await?;
        Ok(Exchange {
            response,
            cache_outcome: CacheOutcome::None,
        })
    }
}

/// Serves GET requests from a private cache, going upstream on a miss
#[derive(Debug, Clone)]
pub struct CachingClient {
    transport: Arc<Transport>,
    cache: Arc<ResponseCache>,
}

impl CachingClient {
    pub fn new(transport: Arc<Transport>, config: CacheConfig) -> Self {
        Self {
            transport,
            cache: Arc::new(ResponseCache::new(config)),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    fn cache_key(request: &Request) -> String {
        request.uri().as_str().to_string()
    }

    /// Drop whatever is stored for the request's URI
    pub fn invalidate(&self, request: &Request) {
        if self.cache.remove(&Self::cache_key(request)).is_err() {
            tracing::warn!("response cache unavailable, entry not invalidated");
        }
    }

    async fn upstream(&self, request: &Request, outcome: CacheOutcome) -> Result<Exchange> {
        let response = self.transport.send(request).await?;
        if outcome != CacheOutcome::Failure {
            self.store(request, &response);
        }
        Ok(Exchange {
            response,
            cache_outcome: outcome,
        })
    }

    fn store(&self, request: &Request, response: &RawResponse) {
        let key = Self::cache_key(request);
        let body_len = response.body().map(Bytes::len).unwrap_or(0);
        let result = if cache_policy::is_storable(
            response.status(),
            response.headers(),
            body_len,
            self.cache.config().max_object_size,
        ) {
            self.cache
                .put(&key, CachedResponse::new(response, request.headers()))
                .map(|_| ())
        } else {
            self.cache.remove(&key)
        };
        if result.is_err() {
            tracing::warn!(key = %key, "response cache unavailable, response not stored");
        }
    }

    async fn revalidate(&self, request: &Request, mut entry: CachedResponse) -> Result<Exchange> {
        let mut headers = request.headers().clone();
        if let Some(etag) = entry.etag() {
            headers.insert(IF_NONE_MATCH, etag.clone());
        }
        if let Some(last_modified) = entry.last_modified() {
            headers.insert(IF_MODIFIED_SINCE, last_modified.clone());
        }
        let conditional = request.clone().with_headers(headers);

        let response = self.transport.send(&conditional).await?;
        if response.status() != StatusCode::NOT_MODIFIED {
            self.store(request, &response);
            return Ok(Exchange {
                response,
                cache_outcome: CacheOutcome::CacheMiss,
            });
        }

        entry.refresh(&response);
        let refreshed = entry.to_response();
        if self.cache.put(&Self::cache_key(request), entry).is_err() {
            tracing::warn!("response cache unavailable, validated entry not stored");
        }
        Ok(Exchange {
            response: refreshed,
            cache_outcome: CacheOutcome::Validated,
        })
    }
}

/// `504 Gateway Timeout` generated when `only-if-cached` cannot be satisfied
fn gateway_timeout() -> RawResponse {
    RawResponse::new(StatusCode::GATEWAY_TIMEOUT, HeaderMap::new(), Bytes::new())
}

impl HttpClient for CachingClient {
    async fn execute(&self, request: &Request) -> Result<Exchange> {
        debug_assert!(
            request.verb().is_cacheable(),
            "{} requests are routed to the plain client",
            request.verb()
        );
        let control = CacheControl::from_headers(request.headers());
        if control.no_store {
            let response = self.transport.send(request).await?;
            return Ok(Exchange {
                response,
                cache_outcome: CacheOutcome::CacheMiss,
            });
        }

        let entry = match self.cache.get(&Self::cache_key(request)) {
            Ok(entry) => entry.filter(|entry| entry.matches(request.headers())),
            Err(_) => {
                tracing::warn!("response cache unavailable, going upstream");
                return self.upstream(request, CacheOutcome::Failure).await;
            }
        };

        match entry {
            Some(entry) if entry.is_fresh() && !control.requires_revalidation() => Ok(Exchange {
                response: entry.to_response(),
                cache_outcome: CacheOutcome::CacheHit,
            }),
            _ if control.only_if_cached => Ok(Exchange {
                response: gateway_timeout(),
                cache_outcome: CacheOutcome::CacheModuleResponse,
            }),
            Some(entry) if entry.can_revalidate() => self.revalidate(request, entry).await,
            _ => self.upstream(request, CacheOutcome::CacheMiss).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::connection::ConnectionManager;
    use crate::http::proxy::CredentialContext;
    use crate::http::request::make_uri;
    use crate::http::retry::DefaultRetryStrategy;
    use crate::http::timeout::RequestConfig;
    use reqwest::header::{HeaderValue, CACHE_CONTROL};

    fn caching_client() -> CachingClient {
        let transport = Transport::new(
            ConnectionManager::new(true, None),
            CredentialContext::default(),
            RequestConfig::default(),
            Arc::new(DefaultRetryStrategy::default()),
        )
        .unwrap();
        CachingClient::new(Arc::new(transport), CacheConfig::default())
    }

    #[tokio::test]
    async fn test_no_store_request_bypasses_cache() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/browse/new-releases")
            .with_header("cache-control", "max-age=60")
            .with_body("releases")
            .expect(2)
            .create_async()
            .await;
        let client = caching_client();
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        let request = Request::get(make_uri(&format!("{}/v1/browse/new-releases", server.url())).unwrap())
            .with_headers(headers);

        for _ in 0..2 {
            let exchange = client.execute(&request).await.unwrap();
            assert_eq!(exchange.cache_outcome, CacheOutcome::CacheMiss);
        }
        assert!(client.cache().is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_vary_header_mismatch_goes_upstream() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/me/top/artists")
            .with_header("cache-control", "max-age=60")
            .with_header("vary", "Accept-Language")
            .with_body("top")
            .expect(2)
            .create_async()
            .await;
        let client = caching_client();
        let uri = make_uri(&format!("{}/v1/me/top/artists", server.url())).unwrap();
        let with_language = |language: &'static str| {
            let mut headers = HeaderMap::new();
            headers.insert("accept-language", HeaderValue::from_static(language));
            Request::get(uri.clone()).with_headers(headers)
        };

        let english = client.execute(&with_language("en")).await.unwrap();
        let english_again = client.execute(&with_language("en")).await.unwrap();
        let swedish = client.execute(&with_language("sv")).await.unwrap();

        assert_eq!(english.cache_outcome, CacheOutcome::CacheMiss);
        assert_eq!(english_again.cache_outcome, CacheOutcome::CacheHit);
        assert_eq!(swedish.cache_outcome, CacheOutcome::CacheMiss);
        mock.assert_async().await;
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "POST requests are routed to the plain client")]
    async fn test_unsafe_verb_rejected_by_caching_client() {
        let client = caching_client();
        let request = Request::post(make_uri("http://127.0.0.1:1/v1/playlists").unwrap());
        let _ = client.execute(&request).await;
    }
}
