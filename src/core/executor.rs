//! Job execution traits and the context handed to job bodies.

use std::future::Future;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::core::{AppResult, TaskId, TaskLogger};

/// Everything a job body receives for one task execution.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Task being executed.
    pub task_id: TaskId,
    /// JSON-encoded metadata stored on the task, passed verbatim.
    pub meta_data: String,
    /// Sink for all job output.
    pub logger: TaskLogger,
}

impl JobContext {
    /// Decode the task metadata.
    ///
    /// # Errors
    ///
    /// Returns the decoding error when the metadata does not match `T`.
    pub fn meta<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.meta_data)
    }
}

/// Executable entry point registered under a job name.
///
/// Returning `Err` fails the task; the error chain becomes the task's error
/// detail. Panics are caught by the worker and fail the task as well.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_job_scheduler::core::{AppResult, JobContext, JobExecutor};
///
/// struct NightlyReport;
///
/// #[async_trait]
/// impl JobExecutor for NightlyReport {
///     async fn execute(&self, ctx: JobContext) -> AppResult<()> {
///         ctx.logger.info(format_args!("building report for {}", ctx.task_id));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    /// Run the job body for one task.
    async fn execute(&self, ctx: JobContext) -> AppResult<()>;
}

/// Adapter turning an async closure into a [`JobExecutor`].
pub struct FnExecutor<F>(F);

/// Wrap `f` as a job executor.
pub fn job_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    FnExecutor(f)
}

#[async_trait]
impl<F, Fut> JobExecutor for FnExecutor<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    async fn execute(&self, ctx: JobContext) -> AppResult<()> {
        (self.0)(ctx).await
    }
}
