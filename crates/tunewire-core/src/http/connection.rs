//! Connection management
//!
//! Two strategies: a pool of reusable connections shared by concurrent
//! requests, or a single connection used by one request at a time. Either
//! way, requests lease a slot before sending and hold it until the response
//! body has been read completely.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::TransportFailure;
use crate::{Error, Result};

/// Maximum simultaneous connections for the pooled strategy
pub const POOL_MAX_TOTAL: usize = 25;
/// Idle connections kept alive per host by the pooled strategy
pub const POOL_MAX_IDLE_PER_ROUTE: usize = 5;
/// Connect timeout for the single-connection strategy when none is configured
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Connection reuse strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStrategy {
    Pooled,
    Single,
}

/// Hands out connection slots to requests
#[derive(Debug)]
pub struct ConnectionManager {
    strategy: ConnectionStrategy,
    slots: Arc<Semaphore>,
    max_connections: usize,
    connect_timeout: Option<Duration>,
}

impl ConnectionManager {
    /// Pooled managers ignore `connect_timeout`; the single-connection
    /// manager applies it (or [`DEFAULT_CONNECT_TIMEOUT`]).
    pub fn new(pooled: bool, connect_timeout: Option<Duration>) -> Self {
        let (strategy, max_connections, connect_timeout) = if pooled {
            tracing::debug!("using pooled connection manager");
            (ConnectionStrategy::Pooled, POOL_MAX_TOTAL, None)
        } else {
            tracing::debug!("using single-connection manager");
            (
                ConnectionStrategy::Single,
                1,
                Some(connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT)),
            )
        };

        Self {
            strategy,
            slots: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            connect_timeout,
        }
    }

    pub fn strategy(&self) -> ConnectionStrategy {
        self.strategy
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Slots not currently leased
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Configure the HTTP client's connection pool to match this strategy
    pub(crate) fn configure(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        let idle_per_host = match self.strategy {
            ConnectionStrategy::Pooled => POOL_MAX_IDLE_PER_ROUTE,
            ConnectionStrategy::Single => 1,
        };
        let builder = builder.pool_max_idle_per_host(idle_per_host);
        match self.connect_timeout {
            Some(timeout) => builder.connect_timeout(timeout),
            None => builder,
        }
    }

    /// Lease a connection slot, waiting at most `timeout`
    pub async fn acquire(&self, timeout: Duration) -> Result<ConnectionLease> {
        let slots = Arc::clone(&self.slots);
        match tokio::time::timeout(timeout, slots.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(ConnectionLease { _permit: permit }),
            Ok(Err(e)) => Err(Error::Internal {
                message: "connection manager is shut down".to_string(),
                source: Some(e.into()),
            }),
            Err(_) => Err(Error::Io {
                message: format!(
                    "timed out after {:?} waiting for a connection from the {:?} manager",
                    timeout, self.strategy
                ),
                failure: TransportFailure::ConnectionRequestTimeout,
                source: None,
            }),
        }
    }
}

/// A leased connection slot, returned to the manager on drop
#[derive(Debug)]
pub struct ConnectionLease {
    _permit: OwnedSemaphorePermit,
}
