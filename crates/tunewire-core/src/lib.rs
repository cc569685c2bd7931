//! Tunewire Core - HTTP access layer for the music Web API
//!
//! Every endpoint request built by a client library goes through one
//! [`HttpManager`]. The manager owns the connection pool, proxy credentials,
//! a private cache for GET responses and a worker runtime, and turns every
//! response into either its body text or a typed [`Error`].
//!
//! # Main Components
//!
//! - **Error Handling**: Status-derived and transport errors using `thiserror` and `anyhow`
//! - **Request Execution**: Blocking and cancellable asynchronous execution
//! - **Caching**: Private HTTP cache with validation for GET requests
//! - **Configuration**: Builder with environment overrides
//!
//! # Example
//!
//! ```no_run
//! use tunewire_core::http::{make_uri, HeaderMap, HttpManager, RequestExecutor};
//! use tunewire_core::Result;
//!
//! fn example() -> Result<()> {
//!     let manager = HttpManager::builder().pooling_connection_manager().build()?;
//!     let uri = make_uri("https://api.example.com/v1/artists/0OdUWJ0sBjDrqHygGUXeCF")?;
//!     let body = manager.get(uri, HeaderMap::new())?;
//!     println!("{:?}", body);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod http;

// Re-export main types for convenience
pub use error::{Error, Result, TransportFailure};
pub use http::{
    // Facade
    HttpManager, HttpManagerBuilder, HttpManagerConfig, RequestExecutor, PendingResponse,

    // Requests and responses
    Request, Verb, Body, RawResponse, make_uri, parse_body,

    // Caching
    CacheConfig, CacheOutcome,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
