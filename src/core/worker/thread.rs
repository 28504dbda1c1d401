//! Thread-backed worker launcher.
//!
//! Each worker gets a dedicated OS thread with its own single-threaded tokio
//! runtime, so CPU-bound jobs never block the scheduler's runtime.
//! Termination aborts the job at its next await point and tears the runtime
//! down; jobs that must be stoppable while blocking should use the process
//! backend.

use std::thread;

use crossbeam_channel::Sender;
use tracing::{debug, error};

use super::{kill_requested, run_job, LaunchSpec, WorkerEvent, WorkerHandle, WorkerLauncher};
use crate::core::{JobContext, JobRegistry, SchedulerError, TaskLogger};

/// Default stack size for worker threads (2 MiB).
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Runs jobs from an in-process registry on dedicated OS threads.
#[derive(Debug, Clone)]
pub struct ThreadLauncher {
    registry: JobRegistry,
    stack_size: usize,
}

impl ThreadLauncher {
    /// Launcher resolving job names against `registry`.
    #[must_use]
    pub const fn new(registry: JobRegistry) -> Self {
        Self {
            registry,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    /// Override the worker thread stack size.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

impl WorkerLauncher for ThreadLauncher {
    fn launch(
        &self,
        spec: LaunchSpec,
        events: Sender<WorkerEvent>,
    ) -> Result<WorkerHandle, SchedulerError> {
        let executor = self.registry.resolve(&spec.job_name)?;
        let (handle, kill_rx) = WorkerHandle::channel();
        let task_id = spec.task_id;
        let ctx = JobContext {
            task_id,
            meta_data: spec.meta_data,
            logger: TaskLogger::to_file(spec.log_file),
        };

        thread::Builder::new()
            .name(format!("pjs-worker-{task_id}"))
            .stack_size(self.stack_size)
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!(task_id = %task_id, error = %e, "failed to create worker runtime");
                        let _ = events.send(WorkerEvent::error(
                            task_id,
                            format!("failed to create worker runtime: {e}"),
                        ));
                        return;
                    }
                };

                let _ = events.send(WorkerEvent::online(task_id));
                debug!(task_id = %task_id, "worker thread started");

                let outcome = rt.block_on(async move {
                    tokio::select! {
                        outcome = run_job(executor, ctx) => Ok(outcome),
                        stopped = kill_requested(kill_rx) => Err(stopped),
                    }
                });
                // Dropping the runtime drops the job's task along with its log handle.
                drop(rt);

                match outcome {
                    Ok(outcome) => {
                        debug!(task_id = %task_id, code = outcome.code, "worker thread exiting");
                        let _ = events.send(WorkerEvent::exit(task_id, outcome.code, outcome.detail));
                    }
                    Err(stopped) => {
                        debug!(task_id = %task_id, "worker thread terminated");
                        let _ = stopped.send(());
                    }
                }
            })
            .map_err(|e| SchedulerError::WorkerLaunch(format!("failed to spawn worker thread: {e}")))?;

        Ok(handle)
    }

    fn backend(&self) -> &'static str {
        "thread"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::worker::{WorkerEventKind, EXIT_JOB_FAILED};
    use crate::core::{job_fn, JobContext};
    use std::time::Duration;
    use uuid::Uuid;

    fn spec(job_name: &str) -> LaunchSpec {
        let dir = std::env::temp_dir().join(format!("pjs-thread-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let task_id = Uuid::new_v4();
        let log_path = dir.join(format!("{task_id}.log"));
        LaunchSpec {
            task_id,
            job_name: job_name.into(),
            program: "/bin/worker".into(),
            meta_data: "{}".into(),
            log_file: std::fs::File::create(&log_path).unwrap(),
            log_path,
        }
    }

    fn registry() -> JobRegistry {
        JobRegistry::builder()
            .register("ok", job_fn(|ctx: JobContext| async move {
                ctx.logger.info("hello");
                Ok(())
            }))
            .register("fails", job_fn(|_| async { anyhow::bail!("no input") }))
            .register("sleeps", job_fn(|_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }))
            .build()
    }

    #[test]
    fn test_reports_online_then_exit() {
        let launcher = ThreadLauncher::new(registry());
        let (tx, rx) = crossbeam_channel::unbounded();
        let spec = spec("ok");
        let task_id = spec.task_id;
        let _handle = launcher.launch(spec, tx).unwrap();

        let timeout = Duration::from_secs(5);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), WorkerEvent::online(task_id));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), WorkerEvent::exit(task_id, 0, None));
    }

    #[test]
    fn test_job_error_becomes_non_zero_exit() {
        let launcher = ThreadLauncher::new(registry());
        let (tx, rx) = crossbeam_channel::unbounded();
        let _handle = launcher.launch(spec("fails"), tx).unwrap();

        let timeout = Duration::from_secs(5);
        assert!(matches!(rx.recv_timeout(timeout).unwrap().kind, WorkerEventKind::Online));
        match rx.recv_timeout(timeout).unwrap().kind {
            WorkerEventKind::Exit { code, detail } => {
                assert_eq!(code, EXIT_JOB_FAILED);
                assert_eq!(detail.as_deref(), Some("no input"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_terminate_suppresses_exit() {
        let launcher = ThreadLauncher::new(registry());
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut handle = launcher.launch(spec("sleeps"), tx).unwrap();

        let timeout = Duration::from_secs(5);
        assert!(matches!(rx.recv_timeout(timeout).unwrap().kind, WorkerEventKind::Online));
        assert!(handle.terminate());
        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
    }

    #[test]
    fn test_unknown_job_fails_launch() {
        let launcher = ThreadLauncher::new(registry());
        let (tx, _rx) = crossbeam_channel::unbounded();
        let err = launcher.launch(spec("missing"), tx).unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownJob(_)));
    }
}
