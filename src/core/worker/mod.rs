//! Worker execution units.
//!
//! A worker runs one job for one task in an isolated execution context and
//! reports back to the scheduler through [`WorkerEvent`]s on a crossbeam
//! channel. Two backends implement [`WorkerLauncher`]:
//!
//! - [`ThreadLauncher`]: a dedicated OS thread with its own current-thread
//!   tokio runtime, running the job from an in-process [`JobRegistry`].
//! - [`ProcessLauncher`]: a child process started as `<path> <jobName>`,
//!   which hands control to [`entry::worker_main`].
//!
//! [`JobRegistry`]: crate::core::JobRegistry

pub mod entry;
pub mod process;
pub mod thread;

use std::any::Any;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::Sender;
use tokio::sync::oneshot;

use crate::core::{JobContext, JobExecutor, SchedulerError, TaskId};

pub use process::ProcessLauncher;
pub use thread::ThreadLauncher;

/// Exit code of a job that returned `Ok`.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code of a job that returned `Err`.
pub const EXIT_JOB_FAILED: i32 = 1;
/// Exit code of a worker started with a missing or unknown job.
pub const EXIT_BAD_INVOCATION: i32 = 2;
/// Exit code of a job that panicked.
pub const EXIT_PANICKED: i32 = 101;
/// Exit code reported for a forcibly terminated worker.
pub const EXIT_TERMINATED: i32 = 137;

/// Notification emitted by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEventKind {
    /// The execution context started.
    Online,
    /// The worker could not be started or supervised.
    Error(String),
    /// The worker finished; `code == 0` means success.
    Exit {
        /// Exit code.
        code: i32,
        /// Failure detail reported by the job, if any.
        detail: Option<String>,
    },
}

/// A worker notification for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEvent {
    /// Task the worker runs.
    pub task_id: TaskId,
    /// What happened.
    pub kind: WorkerEventKind,
}

impl WorkerEvent {
    /// `Online` event.
    #[must_use]
    pub const fn online(task_id: TaskId) -> Self {
        Self {
            task_id,
            kind: WorkerEventKind::Online,
        }
    }

    /// `Error` event.
    #[must_use]
    pub fn error(task_id: TaskId, detail: impl Into<String>) -> Self {
        Self {
            task_id,
            kind: WorkerEventKind::Error(detail.into()),
        }
    }

    /// `Exit` event.
    #[must_use]
    pub const fn exit(task_id: TaskId, code: i32, detail: Option<String>) -> Self {
        Self {
            task_id,
            kind: WorkerEventKind::Exit { code, detail },
        }
    }
}

/// Everything needed to start a worker for one claimed task.
#[derive(Debug)]
pub struct LaunchSpec {
    /// Task to execute.
    pub task_id: TaskId,
    /// Registered job name.
    pub job_name: String,
    /// Program part of the job's script path.
    pub program: String,
    /// JSON-encoded task metadata.
    pub meta_data: String,
    /// Freshly truncated `<logsPath>/<taskId>.log`.
    pub log_file: File,
    /// Path of `log_file`.
    pub log_path: PathBuf,
}

/// Kill request as seen by a worker. It carries a sender the worker fires,
/// or drops, once it has actually stopped.
pub type KillSignal = oneshot::Receiver<oneshot::Sender<()>>;

/// Scheduler-side handle to a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    kill: Option<oneshot::Sender<oneshot::Sender<()>>>,
}

impl WorkerHandle {
    /// Handle paired with the signal the worker watches.
    #[must_use]
    pub fn channel() -> (Self, KillSignal) {
        let (tx, rx) = oneshot::channel();
        (Self { kill: Some(tx) }, rx)
    }

    /// Forcibly stop the worker. Returns `false` if it was already signalled.
    pub fn terminate(&mut self) -> bool {
        self.stop().is_some()
    }

    /// Forcibly stop the worker and return a receiver that resolves once it
    /// has stopped. Returns `None` if it was already signalled.
    pub fn stop(&mut self) -> Option<oneshot::Receiver<()>> {
        let kill = self.kill.take()?;
        let (stopped_tx, stopped_rx) = oneshot::channel();
        // A worker that already exited dropped its signal; the receiver then
        // resolves at once.
        let _ = kill.send(stopped_tx);
        Some(stopped_rx)
    }
}

/// Starts isolated execution contexts for claimed tasks.
pub trait WorkerLauncher: Send + Sync + 'static {
    /// Start a worker for `spec`, reporting on `events`.
    ///
    /// The launcher sends `Online` once the context is running and exactly
    /// one `Exit` or `Error` afterwards, unless the worker is terminated
    /// through the returned handle, in which case it sends nothing further.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::WorkerLaunch` or `SchedulerError::UnknownJob`
    /// when the context cannot be started.
    fn launch(
        &self,
        spec: LaunchSpec,
        events: Sender<WorkerEvent>,
    ) -> Result<WorkerHandle, SchedulerError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Exit code and detail of one job execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Exit code following the `EXIT_*` constants.
    pub code: i32,
    /// Failure detail, if the job did not succeed.
    pub detail: Option<String>,
}

/// Run a job body on the current runtime, converting errors and panics into
/// exit codes. Failures are also written to the task log.
pub async fn run_job(executor: Arc<dyn JobExecutor>, ctx: JobContext) -> JobOutcome {
    let logger = ctx.logger.clone();
    let joined = tokio::spawn(async move { executor.execute(ctx).await }).await;
    let outcome = match joined {
        Ok(Ok(())) => JobOutcome {
            code: EXIT_SUCCESS,
            detail: None,
        },
        Ok(Err(e)) => {
            let detail = format!("{e:#}");
            logger.error(&detail);
            JobOutcome {
                code: EXIT_JOB_FAILED,
                detail: Some(detail),
            }
        }
        Err(e) if e.is_panic() => {
            let detail = format!("job panicked: {}", panic_message(&*e.into_panic()));
            logger.fatal(&detail);
            JobOutcome {
                code: EXIT_PANICKED,
                detail: Some(detail),
            }
        }
        Err(e) => {
            let detail = format!("job cancelled: {e}");
            logger.fatal(&detail);
            JobOutcome {
                code: EXIT_TERMINATED,
                detail: Some(detail),
            }
        }
    };
    logger.close();
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}

/// Resolves once termination was requested through the [`WorkerHandle`],
/// yielding the sender to fire after the worker has stopped.
///
/// Dropping the handle without terminating leaves the worker running.
pub(crate) async fn kill_requested(kill: KillSignal) -> oneshot::Sender<()> {
    match kill.await {
        Ok(stopped) => stopped,
        Err(_) => std::future::pending().await,
    }
}
