//! Private response cache used by the caching client
//!
//! Bounded by entry count (least-recently-used eviction) and by the size of
//! a single response body. Entries remember the request header values named
//! by the response's `Vary` header so a lookup only matches requests that
//! would have produced the same response.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, ETAG, LAST_MODIFIED, TRANSFER_ENCODING};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::http::cache_policy;
use crate::http::response::RawResponse;

/// Default maximum number of cached responses
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;
/// Default maximum body size, in bytes, of a cacheable response
pub const DEFAULT_CACHE_MAX_OBJECT_SIZE: usize = 8192;

/// Cache bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_object_size: usize,
    /// Shared (proxy) caches must not store `private` responses; this cache
    /// always belongs to a single manager
    pub shared: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            max_object_size: DEFAULT_CACHE_MAX_OBJECT_SIZE,
            shared: false,
        }
    }
}

impl CacheConfig {
    /// Build from optional overrides, falling back to defaults
    pub fn from_overrides(max_entries: Option<usize>, max_object_size: Option<usize>) -> Self {
        Self {
            max_entries: max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES),
            max_object_size: max_object_size.unwrap_or(DEFAULT_CACHE_MAX_OBJECT_SIZE),
            shared: false,
        }
    }
}

/// How a response was produced, for diagnostics only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheOutcome {
    /// Served from the cache with no request sent upstream
    CacheHit,
    /// Generated directly by the caching module
    CacheModuleResponse,
    /// Came from the upstream server
    CacheMiss,
    /// Served from the cache after validating the entry with the origin
    Validated,
    /// Came from the upstream server after a cache failure
    Failure,
    /// The request did not go through a cache
    None,
}

impl CacheOutcome {
    pub fn description(&self) -> &'static str {
        match self {
            CacheOutcome::CacheHit => "response generated from the cache with no request sent upstream",
            CacheOutcome::CacheModuleResponse => "response generated directly by the caching module",
            CacheOutcome::CacheMiss => "response came from an upstream server",
            CacheOutcome::Validated => {
                "response generated from the cache after validating the entry with the origin server"
            }
            CacheOutcome::Failure => "response came from an upstream server after a cache failure",
            CacheOutcome::None => "response did not pass through a cache",
        }
    }
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheOutcome::CacheHit => "cache_hit",
            CacheOutcome::CacheModuleResponse => "cache_module_response",
            CacheOutcome::CacheMiss => "cache_miss",
            CacheOutcome::Validated => "validated",
            CacheOutcome::Failure => "failure",
            CacheOutcome::None => "none",
        };
        write!(f, "{}", name)
    }
}

/// The cache's lock was poisoned by a panicking thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheUnavailable;

/// A stored response plus what is needed to judge and revalidate it
#[derive(Debug, Clone)]
pub struct CachedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    stored_at: Instant,
    initial_age: Duration,
    lifetime: Duration,
    /// Request header values selected by `Vary`, as sent when stored
    vary: Vec<(String, Option<HeaderValue>)>,
}

impl CachedResponse {
    pub fn new(response: &RawResponse, request_headers: &HeaderMap) -> Self {
        let headers = response.headers().clone();
        let vary = cache_policy::vary_names(&headers)
            .into_iter()
            .map(|name| {
                let value = request_headers.get(name.as_str()).cloned();
                (name, value)
            })
            .collect();
        Self {
            status: response.status(),
            initial_age: cache_policy::initial_age(&headers),
            lifetime: cache_policy::freshness_lifetime(&headers),
            headers,
            body: response.body().cloned().unwrap_or_default(),
            stored_at: Instant::now(),
            vary,
        }
    }

    pub fn age(&self) -> Duration {
        self.initial_age + self.stored_at.elapsed()
    }

    pub fn is_fresh(&self) -> bool {
        self.age() < self.lifetime
    }

    pub fn etag(&self) -> Option<&HeaderValue> {
        self.headers.get(ETAG)
    }

    pub fn last_modified(&self) -> Option<&HeaderValue> {
        self.headers.get(LAST_MODIFIED)
    }

    pub fn can_revalidate(&self) -> bool {
        self.etag().is_some() || self.last_modified().is_some()
    }

    /// Whether this entry answers a request carrying `request_headers`
    pub fn matches(&self, request_headers: &HeaderMap) -> bool {
        self.vary
            .iter()
            .all(|(name, value)| request_headers.get(name.as_str()) == value.as_ref())
    }

    /// Merge the headers of a `304 Not Modified` and restart the entry's clock
    pub fn refresh(&mut self, not_modified: &RawResponse) {
        let updates: Vec<(HeaderName, HeaderValue)> = not_modified
            .headers()
            .iter()
            .filter(|(name, _)| **name != CONTENT_LENGTH && **name != TRANSFER_ENCODING)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for (name, _) in &updates {
            self.headers.remove(name);
        }
        for (name, value) in updates {
            self.headers.append(name, value);
        }
        self.initial_age = cache_policy::initial_age(&self.headers);
        self.lifetime = cache_policy::freshness_lifetime(&self.headers);
        self.stored_at = Instant::now();
    }

    pub fn to_response(&self) -> RawResponse {
        let mut response = RawResponse::new(self.status, self.headers.clone(), self.body.clone());
        if let Ok(age) = HeaderValue::from_str(&self.age().as_secs().to_string()) {
            response.headers_mut().insert("age", age);
        }
        response
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, (CachedResponse, u64)>,
    tick: u64,
}

/// Bounded least-recently-used response store
#[derive(Debug)]
pub struct ResponseCache {
    config: CacheConfig,
    entries: Mutex<Entries>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up an entry, marking it most recently used
    pub fn get(&self, key: &str) -> Result<Option<CachedResponse>, CacheUnavailable> {
        let mut entries = self.entries.lock().map_err(|_| CacheUnavailable)?;
        entries.tick += 1;
        let tick = entries.tick;
        Ok(entries.map.get_mut(key).map(|(entry, used)| {
            *used = tick;
            entry.clone()
        }))
    }

    /// Store an entry unless it breaks a bound; returns whether it was stored
    pub fn put(&self, key: &str, entry: CachedResponse) -> Result<bool, CacheUnavailable> {
        if self.config.max_entries == 0 || entry.body.len() > self.config.max_object_size {
            return Ok(false);
        }

        let mut entries = self.entries.lock().map_err(|_| CacheUnavailable)?;
        if !entries.map.contains_key(key) && entries.map.len() >= self.config.max_entries {
            let oldest = entries
                .map
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.map.remove(&oldest);
                tracing::trace!(key = %oldest, "evicted least recently used cache entry");
            }
        }
        entries.tick += 1;
        let tick = entries.tick;
        entries.map.insert(key.to_string(), (entry, tick));
        Ok(true)
    }

    pub fn remove(&self, key: &str) -> Result<(), CacheUnavailable> {
        let mut entries = self.entries.lock().map_err(|_| CacheUnavailable)?;
        entries.map.remove(key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
