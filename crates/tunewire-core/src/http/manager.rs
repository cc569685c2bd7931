//! HTTP manager facade
//!
//! [`HttpManager`] is built once and shared by every endpoint request. GET
//! requests go through the caching client, everything else through the
//! plain client; both responses are classified into a body or a typed error.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use tracing::instrument::WithSubscriber;
use tracing::Instrument;
use url::Url;

use crate::http::cache::CacheConfig;
use crate::http::classifier::classify;
use crate::http::client::{CachingClient, Exchange, HttpClient, PlainClient};
use crate::http::config::{HttpManagerBuilder, HttpManagerConfig};
use crate::http::connection::{ConnectionManager, ConnectionStrategy};
use crate::http::proxy::CredentialContext;
use crate::http::request::{Body, Request, Verb};
use crate::http::retry::RetryStrategy;
use crate::http::timeout::RequestConfig;
use crate::http::transport::Transport;
use crate::http::worker::{PendingResponse, Worker};
use crate::Result;

/// Executes requests against the Web API.
///
/// Endpoint builders depend on this trait rather than on [`HttpManager`].
pub trait RequestExecutor {
    /// Execute and block until the body or an error is available
    fn execute(&self, request: Request) -> Result<Option<String>>;

    /// Start executing and return immediately
    fn execute_async(&self, request: Request) -> PendingResponse;

    fn get(&self, uri: Url, headers: HeaderMap) -> Result<Option<String>> {
        self.execute(Request::get(uri).with_headers(headers))
    }

    fn post(&self, uri: Url, headers: HeaderMap, body: Option<Body>) -> Result<Option<String>> {
        self.execute(Request::post(uri).with_headers(headers).with_body(body))
    }

    fn put(&self, uri: Url, headers: HeaderMap, body: Option<Body>) -> Result<Option<String>> {
        self.execute(Request::put(uri).with_headers(headers).with_body(body))
    }

    fn delete(&self, uri: Url, headers: HeaderMap, body: Option<Body>) -> Result<Option<String>> {
        self.execute(Request::delete(uri).with_headers(headers).with_body(body))
    }
}

#[derive(Debug)]
struct Shared {
    config: HttpManagerConfig,
    transport: Arc<Transport>,
    plain: PlainClient,
    caching: CachingClient,
    dispatch: tracing::Dispatch,
}

impl Shared {
    async fn exchange(&self, request: &Request) -> Result<Exchange> {
        debug_assert!(!request.uri().as_str().is_empty(), "request URI must not be empty");
        tracing::trace!(headers = ?request.redacted_headers(), "request headers");

        let exchange = match request.verb() {
            Verb::Get => self.caching.execute(request).await?,
            Verb::Post | Verb::Put | Verb::Delete => {
                let result = self.plain.execute(request).await;
                // Unsafe methods make anything cached for the URI stale, even
                // when the response was lost after the server applied them
                self.caching.invalidate(request);
                result?
            }
        };

        tracing::debug!(outcome = %exchange.cache_outcome, "cache response status");
        Ok(exchange)
    }
}

/// Shared HTTP access layer
#[derive(Debug)]
pub struct HttpManager {
    shared: Arc<Shared>,
    worker: Worker,
}

impl HttpManager {
    /// Manager with default settings
    pub fn new() -> Result<Self> {
        HttpManagerBuilder::new().build()
    }

    pub fn builder() -> HttpManagerBuilder {
        HttpManagerBuilder::new()
    }

    pub(crate) fn from_parts(
        config: HttpManagerConfig,
        retry: Arc<dyn RetryStrategy>,
        dispatch: tracing::Dispatch,
    ) -> Result<Self> {
        tracing::dispatcher::with_default(&dispatch, || -> Result<Self> {
            let connections = ConnectionManager::new(
                config.use_pooling_connection_manager,
                config.connect_timeout,
            );
            let credentials =
                CredentialContext::new(config.proxy.clone(), config.proxy_credentials.clone());
            let transport = Arc::new(Transport::new(
                connections,
                credentials,
                config.request_config(),
                retry,
            )?);
            let worker = Worker::new(config.worker_threads())?;

            let plain = PlainClient::new(Arc::clone(&transport));
            let caching = CachingClient::new(Arc::clone(&transport), config.cache_config());

            Ok(Self {
                shared: Arc::new(Shared {
                    config,
                    transport,
                    plain,
                    caching,
                    dispatch: dispatch.clone(),
                }),
                worker,
            })
        })
    }

    pub fn config(&self) -> &HttpManagerConfig {
        &self.shared.config
    }

    pub fn cache_config(&self) -> &CacheConfig {
        self.shared.caching.cache().config()
    }

    /// Number of responses currently held by the cache
    pub fn cached_entries(&self) -> usize {
        self.shared.caching.cache().len()
    }

    pub fn connection_strategy(&self) -> ConnectionStrategy {
        self.shared.transport.connections().strategy()
    }

    pub fn request_config(&self) -> &RequestConfig {
        self.shared.transport.request_config()
    }

    /// Execute without classifying the response.
    ///
    /// Returns the raw response and how the cache produced it; callers that
    /// need the status line or headers use this instead of
    /// [`RequestExecutor::execute`].
    pub fn exchange(&self, request: Request) -> Result<Exchange> {
        let shared = Arc::clone(&self.shared);
        let span = self.request_span(&request);
        let task = async move { shared.exchange(&request).await }
            .instrument(span)
            .with_subscriber(self.shared.dispatch.clone());

        self.worker.run(task)
    }

    fn request_span(&self, request: &Request) -> tracing::Span {
        tracing::dispatcher::with_default(&self.shared.dispatch, || {
            tracing::info_span!(
                "tunewire.request",
                verb = %request.verb(),
                uri = %request.uri()
            )
        })
    }
}

impl RequestExecutor for HttpManager {
    fn execute(&self, request: Request) -> Result<Option<String>> {
        self.execute_async(request).join()
    }

    fn execute_async(&self, request: Request) -> PendingResponse {
        let shared = Arc::clone(&self.shared);
        let span = self.request_span(&request);
        let task = async move {
            let exchange = shared.exchange(&request).await?;
            classify(&exchange.response)
        }
        .instrument(span)
        .with_subscriber(self.shared.dispatch.clone());

        self.worker.spawn(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::cache::CacheOutcome;
    use crate::http::request::make_uri;
    use reqwest::header::{HeaderValue, CACHE_CONTROL};
    use std::io::Write;
    use std::sync::Mutex;

    fn manager() -> HttpManager {
        HttpManager::builder().worker_threads(2).build().unwrap()
    }

    fn uri(server: &mockito::Server, path: &str) -> Url {
        make_uri(&format!("{}{}", server.url(), path)).unwrap()
    }

    #[test]
    fn test_cached_get_hits_upstream_once() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/v1/artists/1")
            .with_status(200)
            .with_header("cache-control", "max-age=60")
            .with_body(r#"{"name":"Nina"}"#)
            .expect(1)
            .create();
        let manager = manager();
        let target = uri(&server, "/v1/artists/1");

        let first = manager.exchange(Request::get(target.clone())).unwrap();
        let second = manager.exchange(Request::get(target)).unwrap();

        assert_eq!(first.cache_outcome, CacheOutcome::CacheMiss);
        assert_eq!(second.cache_outcome, CacheOutcome::CacheHit);
        assert_eq!(second.response.text().as_deref(), Some(r#"{"name":"Nina"}"#));
        assert_eq!(manager.cached_entries(), 1);
        mock.assert();
    }

    #[test]
    fn test_unsafe_verbs_bypass_cache() {
        let mut server = mockito::Server::new();
        let mut mocks = Vec::new();
        for method in ["POST", "PUT", "DELETE"] {
            mocks.push(
                server
                    .mock(method, "/v1/playlists")
                    .with_status(200)
                    .with_header("cache-control", "max-age=60")
                    .with_body(r#"{"id":"p1"}"#)
                    .expect(2)
                    .create(),
            );
        }
        let manager = manager();
        let target = uri(&server, "/v1/playlists");

        for _ in 0..2 {
            let requests = [
                Request::post(target.clone()),
                Request::put(target.clone()),
                Request::delete(target.clone()),
            ];
            for request in requests {
                let verb = request.verb();
                let exchange = manager
                    .exchange(request.with_body(Some(Body::json("{}"))))
                    .unwrap();
                assert_eq!(exchange.cache_outcome, CacheOutcome::None, "{verb}");
            }
        }
        assert_eq!(manager.cached_entries(), 0);
        for mock in mocks {
            mock.assert();
        }
    }

    #[test]
    fn test_failed_delete_still_invalidates() {
        let mut server = mockito::Server::new();
        let get = server
            .mock("GET", "/v1/me/albums")
            .with_status(200)
            .with_header("cache-control", "max-age=300")
            .with_body("[]")
            .expect(2)
            .create();
        server
            .mock("DELETE", "/v1/me/albums")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(std::time::Duration::from_millis(500));
                w.write_all(b"{}")
            })
            .create();
        let manager = HttpManager::builder()
            .socket_timeout(std::time::Duration::from_millis(100))
            .build()
            .unwrap();
        let target = uri(&server, "/v1/me/albums");

        manager.get(target.clone(), HeaderMap::new()).unwrap();
        assert_eq!(manager.cached_entries(), 1);

        let err = manager.delete(target.clone(), HeaderMap::new(), None).unwrap_err();
        assert!(matches!(err, crate::Error::Io { .. }));
        assert_eq!(manager.cached_entries(), 0);

        manager.get(target, HeaderMap::new()).unwrap();
        get.assert();
    }

    #[test]
    fn test_stale_entry_is_validated() {
        let mut server = mockito::Server::new();
        let initial = server
            .mock("GET", "/v1/albums/7")
            .match_header("if-none-match", mockito::Matcher::Missing)
            .with_status(200)
            .with_header("etag", "\"v1\"")
            .with_header("cache-control", "no-cache")
            .with_body("album")
            .expect(1)
            .create();
        let conditional = server
            .mock("GET", "/v1/albums/7")
            .match_header("if-none-match", "\"v1\"")
            .with_status(304)
            .expect(1)
            .create();
        let manager = manager();
        let target = uri(&server, "/v1/albums/7");

        manager.exchange(Request::get(target.clone())).unwrap();
        let validated = manager.exchange(Request::get(target)).unwrap();

        assert_eq!(validated.cache_outcome, CacheOutcome::Validated);
        assert_eq!(validated.response.text().as_deref(), Some("album"));
        initial.assert();
        conditional.assert();
    }

    #[test]
    fn test_only_if_cached_miss_is_gateway_timeout() {
        let server = mockito::Server::new();
        let manager = manager();
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("only-if-cached"));

        let exchange = manager
            .exchange(Request::get(uri(&server, "/v1/me")).with_headers(headers))
            .unwrap();

        assert_eq!(exchange.cache_outcome, CacheOutcome::CacheModuleResponse);
        assert_eq!(exchange.response.status().as_u16(), 504);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_injected_dispatch_receives_events() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/v1/me").with_status(200).with_body("{}").create();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let manager = HttpManager::builder()
            .worker_threads(1)
            .log_dispatch(tracing::Dispatch::new(subscriber))
            .build()
            .unwrap();
        let body = manager.get(uri(&server, "/v1/me"), HeaderMap::new()).unwrap();
        assert_eq!(body.as_deref(), Some("{}"));

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("single-connection manager"));
        assert!(output.contains("tunewire.request"));
        assert!(output.contains("cache_miss"));
    }
}
