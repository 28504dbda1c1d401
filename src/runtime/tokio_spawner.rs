//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use crate::core::{SchedulerError, Spawn};

/// Tokio-based spawner that executes tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a new `TokioSpawner` from a tokio runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Spawner for the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Config` when called outside a tokio runtime.
    pub fn current() -> Result<Self, SchedulerError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| SchedulerError::Config(format!("no tokio runtime: {e}")))
    }

    /// Build a multi-threaded runtime for a scheduler host, with one worker
    /// thread per CPU unless `worker_threads` is given.
    ///
    /// The caller keeps the runtime alive; the returned spawner only holds a
    /// handle to it.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the runtime cannot be built.
    pub fn runtime(
        worker_threads: Option<usize>,
    ) -> Result<(tokio::runtime::Runtime, Self), std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.unwrap_or_else(num_cpus::get).max(1))
            .thread_name("pjs-scheduler")
            .enable_all()
            .build()?;
        let spawner = Self::new(runtime.handle().clone());
        Ok((runtime, spawner))
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}
