//! Worker runtime that runs every request, and the handle returned for
//! requests started asynchronously

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use tokio::runtime::{Handle, Runtime};
use tokio::task::{JoinError, JoinHandle};

use crate::{Error, Result};

const THREAD_NAME: &str = "tunewire-http";

/// Multi-threaded runtime owned by the manager
#[derive(Debug)]
pub struct Worker {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl Worker {
    pub fn new(threads: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name(THREAD_NAME)
            .enable_all()
            .build()
            .map_err(|e| Error::Configuration {
                message: format!("Failed to start worker runtime: {}", e),
                source: Some(e.into()),
            })?;
        let handle = runtime.handle().clone();
        tracing::debug!(threads, "worker runtime started");

        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Run `future` on the worker and block the calling thread until it completes
    pub fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        ensure_blocking_allowed()?;
        self.handle
            .block_on(self.handle.spawn(future))
            .unwrap_or_else(|e| Err(join_error(e)))
    }

    /// Start `future` on the worker
    pub fn spawn<F>(&self, future: F) -> PendingResponse
    where
        F: Future<Output = Result<Option<String>>> + Send + 'static,
    {
        PendingResponse {
            task: self.handle.spawn(future),
            runtime: self.handle.clone(),
            cancelled: AtomicBool::new(false),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // shutdown_background never blocks, so dropping from async code is fine
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// A request running on the worker.
///
/// Await it from async code or [`join`](Self::join) it from synchronous
/// code. Once [`cancel`](Self::cancel) is called the response is discarded
/// and the handle resolves to [`Error::Cancelled`].
#[derive(Debug)]
pub struct PendingResponse {
    task: JoinHandle<Result<Option<String>>>,
    runtime: Handle,
    cancelled: AtomicBool,
}

impl PendingResponse {
    /// Abort the request. Has no effect on the server if it was already sent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the request has finished, successfully or not
    pub fn is_finished(&self) -> bool {
        self.is_cancelled() || self.task.is_finished()
    }

    /// Block the calling thread until the request completes.
    ///
    /// Fails with [`Error::Internal`] when called from inside an async
    /// context, where blocking would stall the executor.
    pub fn join(self) -> Result<Option<String>> {
        ensure_blocking_allowed()?;
        let runtime = self.runtime.clone();
        runtime.block_on(self)
    }
}

impl Future for PendingResponse {
    type Output = Result<Option<String>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.is_cancelled() {
            return Poll::Ready(Err(Error::Cancelled));
        }
        Pin::new(&mut self.task)
            .poll(cx)
            .map(|joined| joined.unwrap_or_else(|e| Err(join_error(e))))
    }
}

fn ensure_blocking_allowed() -> Result<()> {
    if Handle::try_current().is_ok() {
        return Err(Error::Internal {
            message: "cannot block on a request from within an async context; await it instead"
                .to_string(),
            source: None,
        });
    }
    Ok(())
}

fn join_error(error: JoinError) -> Error {
    if error.is_cancelled() {
        return Error::Cancelled;
    }
    Error::Internal {
        message: format!("request task failed: {}", error),
        source: Some(anyhow::anyhow!("{}", error)),
    }
}
