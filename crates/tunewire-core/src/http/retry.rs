//! Retry strategy for transport failures
//!
//! Only failures where no response arrived are candidates; HTTP error
//! statuses are classified and returned, never retried here.

use std::fmt;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};

use crate::error::TransportFailure;
use crate::http::request::Request;

/// Decides whether a failed send is attempted again.
///
/// One instance is shared by the caching and the plain client.
pub trait RetryStrategy: Send + Sync + fmt::Debug {
    /// `exec_count` is the number of attempts made so far (1 after the first send)
    fn retry_request(&self, request: &Request, failure: &TransportFailure, exec_count: u32) -> bool;

    /// Delay before attempt `exec_count + 1`
    fn retry_interval(&self, request: &Request, exec_count: u32) -> Duration;
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            jitter: true,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Create an exponential backoff instance
    pub fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.base_delay,
            max_interval: self.max_delay,
            multiplier: self.multiplier,
            max_elapsed_time: None, // attempts are bounded by max_retries
            ..Default::default()
        };

        if !self.jitter {
            backoff.randomization_factor = 0.0;
        }

        backoff.reset();
        backoff
    }
}

/// Retries dropped connections on idempotent requests with exponential backoff
#[derive(Debug, Clone, Default)]
pub struct DefaultRetryStrategy {
    policy: RetryPolicy,
}

impl DefaultRetryStrategy {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

/// Whether a transport failure may succeed on a fresh attempt.
///
/// Connect failures and timeouts are reported immediately; a connection
/// that dropped mid-exchange (typically a stale pooled connection) is worth
/// one more try.
pub fn is_retryable_failure(failure: &TransportFailure) -> bool {
    matches!(failure, TransportFailure::Send)
}

impl RetryStrategy for DefaultRetryStrategy {
    fn retry_request(&self, request: &Request, failure: &TransportFailure, exec_count: u32) -> bool {
        exec_count <= self.policy.max_retries
            && request.is_idempotent()
            && is_retryable_failure(failure)
    }

    fn retry_interval(&self, _request: &Request, exec_count: u32) -> Duration {
        let mut backoff = self.policy.create_backoff();
        (0..exec_count.max(1))
            .filter_map(|_| backoff.next_backoff())
            .last()
            .unwrap_or(self.policy.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::make_uri;

    fn get() -> Request {
        Request::get(make_uri("https://api.example.com/v1/tracks/1").unwrap())
    }

    fn post() -> Request {
        Request::post(make_uri("https://api.example.com/v1/me/player/next").unwrap())
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
        assert!(policy.jitter);
    }

    #[test]
    fn test_max_retries() {
        let strategy = DefaultRetryStrategy::new(RetryPolicy::new(2));
        let request = get();

        assert!(strategy.retry_request(&request, &TransportFailure::Send, 1));
        assert!(strategy.retry_request(&request, &TransportFailure::Send, 2));
        assert!(!strategy.retry_request(&request, &TransportFailure::Send, 3));
    }

    #[test]
    fn test_non_retryable_failures() {
        let strategy = DefaultRetryStrategy::default();
        let request = get();

        for failure in [
            TransportFailure::Connect,
            TransportFailure::Timeout,
            TransportFailure::ConnectionRequestTimeout,
            TransportFailure::Body,
            TransportFailure::Builder,
            TransportFailure::Other,
        ] {
            assert!(!strategy.retry_request(&request, &failure, 1), "{failure:?}");
        }
    }

    #[test]
    fn test_post_retried_only_when_marked_idempotent() {
        let strategy = DefaultRetryStrategy::default();

        assert!(!strategy.retry_request(&post(), &TransportFailure::Send, 1));
        assert!(strategy.retry_request(&post().idempotent(true), &TransportFailure::Send, 1));
    }

    #[test]
    fn test_exponential_backoff() {
        let strategy = DefaultRetryStrategy::new(RetryPolicy::default().with_jitter(false));
        let request = get();

        assert_eq!(strategy.retry_interval(&request, 1), Duration::from_millis(250));
        assert_eq!(strategy.retry_interval(&request, 2), Duration::from_millis(500));
        assert_eq!(strategy.retry_interval(&request, 3), Duration::from_secs(1));
        assert_eq!(strategy.retry_interval(&request, 10), Duration::from_secs(5));
    }
}
