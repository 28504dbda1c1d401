//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The task store could not be reached; callers retry on the next tick.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// Task creation was rejected by validation.
    #[error("invalid task: {0}")]
    InvalidTask(String),
    /// Job registration was rejected by validation.
    #[error("invalid job: {0}")]
    InvalidJob(String),
    /// A referenced job does not exist in the store.
    #[error("job not found: {0}")]
    JobNotFound(String),
    /// A referenced task does not exist in the store.
    #[error("task not found: {0}")]
    TaskNotFound(String),
    /// The job name is not present in the job registry.
    #[error("unknown job: {0}")]
    UnknownJob(String),
    /// The worker execution context could not be started.
    #[error("worker launch failed: {0}")]
    WorkerLaunch(String),
    /// A task log could not be written or delivered.
    #[error("log shipping failed: {0}")]
    LogShipping(String),
    /// Configuration is missing or invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl SchedulerError {
    /// Whether the error is transient and the operation may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Application-facing result using anyhow for job bodies and host code.
pub type AppResult<T> = Result<T, anyhow::Error>;
