//! Process-backed worker launcher.
//!
//! Starts the job's script path `<path> <jobName>` as a child process. The
//! task id and metadata travel in the environment, stdout and stderr are
//! redirected to the task log, and termination kills the child. A failed
//! job's detail is recovered from the last error line it logged.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use super::{
    kill_requested, LaunchSpec, WorkerEvent, WorkerHandle, WorkerLauncher, EXIT_TERMINATED,
};
use crate::core::{last_failure, SchedulerError, Spawn};

/// Environment variable carrying the task id to the child.
pub const TASK_ID_ENV: &str = "SCHEDULER_TASK_ID";
/// Environment variable carrying the JSON-encoded task metadata to the child.
pub const META_DATA_ENV: &str = "SCHEDULER_TASK_META_DATA";

/// Runs every task as a child process, supervised on the given spawner.
#[derive(Debug, Clone)]
pub struct ProcessLauncher<S> {
    spawner: S,
    working_dir: Option<PathBuf>,
}

impl<S> ProcessLauncher<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Launcher supervising children on `spawner`.
    pub const fn new(spawner: S) -> Self {
        Self {
            spawner,
            working_dir: None,
        }
    }

    /// Run children in `dir` instead of the scheduler's working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Failure detail for a non-zero exit: the last `ERROR` or `FATAL` line the
/// job logged, or the bare exit code when it logged none.
async fn reported_failure(log_path: &Path, code: i32) -> String {
    match tokio::fs::read(log_path).await {
        Ok(bytes) => {
            let log = String::from_utf8_lossy(&bytes);
            if let Some(message) = last_failure(&log) {
                return message.to_string();
            }
        }
        Err(e) => {
            warn!(path = %log_path.display(), error = %e, "failed to read task log for failure detail");
        }
    }
    format!("worker process exited with code {code}")
}

impl<S> WorkerLauncher for ProcessLauncher<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    fn launch(
        &self,
        spec: LaunchSpec,
        events: Sender<WorkerEvent>,
    ) -> Result<WorkerHandle, SchedulerError> {
        let task_id = spec.task_id;
        let launch_err = |e: std::io::Error| {
            SchedulerError::WorkerLaunch(format!("`{} {}`: {e}", spec.program, spec.job_name))
        };

        let stdout = spec.log_file.try_clone().map_err(launch_err)?;
        let mut command = tokio::process::Command::new(&spec.program);
        command
            .arg(&spec.job_name)
            .env(TASK_ID_ENV, task_id.to_string())
            .env(META_DATA_ENV, &spec.meta_data)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(spec.log_file))
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        let mut child = command.spawn().map_err(launch_err)?;

        let (handle, kill_rx) = WorkerHandle::channel();
        let _ = events.send(WorkerEvent::online(task_id));
        debug!(task_id = %task_id, pid = ?child.id(), "worker process started");

        let log_path = spec.log_path;
        self.spawner.spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                stopped = kill_requested(kill_rx) => {
                    if let Err(e) = child.kill().await {
                        warn!(task_id = %task_id, error = %e, "failed to kill worker process");
                    } else {
                        debug!(task_id = %task_id, "worker process killed");
                    }
                    let _ = stopped.send(());
                    return;
                }
            };
            match status {
                Ok(status) => {
                    let code = status.code().unwrap_or(EXIT_TERMINATED);
                    let detail = if code == 0 {
                        None
                    } else {
                        Some(reported_failure(&log_path, code).await)
                    };
                    debug!(task_id = %task_id, code, "worker process exited");
                    let _ = events.send(WorkerEvent::exit(task_id, code, detail));
                }
                Err(e) => {
                    let _ = events.send(WorkerEvent::error(
                        task_id,
                        format!("failed to wait for worker process: {e}"),
                    ));
                }
            }
        });

        Ok(handle)
    }

    fn backend(&self) -> &'static str {
        "process"
    }
}
