//! HTTP caching rules for a private (non-shared) cache
//!
//! Cache-Control parsing, freshness lifetime, storability and the request
//! directives that bypass or constrain the cache.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CACHE_CONTROL, DATE, ETAG, EXPIRES, LAST_MODIFIED, PRAGMA, VARY};
use reqwest::StatusCode;

/// Statuses that may be stored without further qualification
const STORABLE_STATUSES: [u16; 5] = [200, 203, 300, 301, 410];

/// Parsed `Cache-Control` directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub only_if_cached: bool,
    pub max_age: Option<u64>,
}

impl CacheControl {
    /// Parse every `Cache-Control` header; `Pragma: no-cache` counts as `no-cache`
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut control = CacheControl::default();

        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else { continue };
            for directive in value.split(',') {
                let directive = directive.trim();
                let (name, argument) = match directive.split_once('=') {
                    Some((name, argument)) => (name.trim(), Some(argument.trim().trim_matches('"'))),
                    None => (directive, None),
                };
                match name.to_ascii_lowercase().as_str() {
                    "no-store" => control.no_store = true,
                    "no-cache" => control.no_cache = true,
                    "only-if-cached" => control.only_if_cached = true,
                    "max-age" => {
                        control.max_age = argument.and_then(|a| a.parse().ok()).or(control.max_age)
                    }
                    _ => {}
                }
            }
        }

        if headers
            .get_all(PRAGMA)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.to_ascii_lowercase().contains("no-cache"))
        {
            control.no_cache = true;
        }

        control
    }

    /// Request asks for an entry validated with the origin
    pub fn requires_revalidation(&self) -> bool {
        self.no_cache || self.max_age == Some(0)
    }
}

/// Whether a response may be stored, given the configured size bound
pub fn is_storable(status: StatusCode, headers: &HeaderMap, body_len: usize, max_object_size: usize) -> bool {
    if !STORABLE_STATUSES.contains(&status.as_u16()) {
        return false;
    }
    if body_len > max_object_size {
        return false;
    }
    if CacheControl::from_headers(headers).no_store {
        return false;
    }
    if vary_names(headers).iter().any(|name| name == "*") {
        return false;
    }
    !freshness_lifetime(headers).is_zero() || has_validator(headers)
}

/// Freshness lifetime from `max-age`, else `Expires` minus `Date`.
///
/// `s-maxage` only applies to shared caches and is ignored; `no-cache`
/// makes the entry stale from the start.
pub fn freshness_lifetime(headers: &HeaderMap) -> Duration {
    let control = CacheControl::from_headers(headers);
    if control.no_cache {
        return Duration::ZERO;
    }
    if let Some(max_age) = control.max_age {
        return Duration::from_secs(max_age);
    }

    let Some(expires) = header_date(headers, EXPIRES.as_str()) else {
        return Duration::ZERO;
    };
    let date = header_date(headers, DATE.as_str()).unwrap_or_else(Utc::now);
    (expires - date).to_std().unwrap_or(Duration::ZERO)
}

/// Age the response already had when it arrived (`Age` header)
pub fn initial_age(headers: &HeaderMap) -> Duration {
    headers
        .get("age")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::ZERO)
}

pub fn has_validator(headers: &HeaderMap) -> bool {
    headers.contains_key(ETAG) || headers.contains_key(LAST_MODIFIED)
}

/// Lower-cased header names listed in `Vary`
pub fn vary_names(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

fn header_date(headers: &HeaderMap, name: &str) -> Option<DateTime<Utc>> {
    let value = headers.get(name)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}
