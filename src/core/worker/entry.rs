//! Entry point for worker processes.
//!
//! A host binary that registers its jobs calls [`worker_main`] when it is
//! started by the [`ProcessLauncher`](super::ProcessLauncher) as
//! `<path> <jobName>`:
//!
//! ```rust,ignore
//! fn main() -> std::process::ExitCode {
//!     let registry = JobRegistry::builder()
//!         .register("nightly-report", NightlyReport)
//!         .build();
//!     worker_main(&registry)
//! }
//! ```

use std::process::ExitCode;

use super::process::{META_DATA_ENV, TASK_ID_ENV};
use super::{run_job, EXIT_BAD_INVOCATION};
use crate::core::{JobContext, JobRegistry, TaskId, TaskLogger};

/// Run `job_name` for `task_id` and return the process exit code.
pub async fn execute_entry(
    registry: &JobRegistry,
    job_name: &str,
    task_id: TaskId,
    meta_data: String,
    logger: TaskLogger,
) -> i32 {
    let Some(executor) = registry.get(job_name) else {
        logger.fatal(format_args!("unknown job `{job_name}`"));
        logger.close();
        return EXIT_BAD_INVOCATION;
    };
    logger.debug(format_args!("running job `{job_name}` for task {task_id}"));
    let ctx = JobContext {
        task_id,
        meta_data,
        logger,
    };
    run_job(executor, ctx).await.code
}

/// Parse the invocation and run the job on a fresh current-thread runtime.
///
/// `args` are the process arguments including the program name; the job name
/// is the first argument after it. The task id and metadata are read from
/// the environment.
pub fn run_worker_entry(registry: &JobRegistry, args: impl IntoIterator<Item = String>) -> i32 {
    let logger = TaskLogger::to_stdout();
    let Some(job_name) = args.into_iter().nth(1) else {
        logger.fatal("missing job name argument");
        logger.close();
        return EXIT_BAD_INVOCATION;
    };
    let task_id = match std::env::var(TASK_ID_ENV).map(|raw| raw.parse::<TaskId>()) {
        Ok(Ok(id)) => id,
        Ok(Err(e)) => {
            logger.fatal(format_args!("invalid {TASK_ID_ENV}: {e}"));
            logger.close();
            return EXIT_BAD_INVOCATION;
        }
        Err(e) => {
            logger.fatal(format_args!("{TASK_ID_ENV}: {e}"));
            logger.close();
            return EXIT_BAD_INVOCATION;
        }
    };
    let meta_data = std::env::var(META_DATA_ENV).unwrap_or_else(|_| "{}".into());

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            logger.fatal(format_args!("failed to create worker runtime: {e}"));
            logger.close();
            return EXIT_BAD_INVOCATION;
        }
    };
    rt.block_on(execute_entry(registry, &job_name, task_id, meta_data, logger))
}

/// Process entry point for worker binaries.
#[must_use]
pub fn worker_main(registry: &JobRegistry) -> ExitCode {
    let code = run_worker_entry(registry, std::env::args());
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job_fn;
    use crate::core::worker::{EXIT_JOB_FAILED, EXIT_SUCCESS};

    fn quiet() -> TaskLogger {
        TaskLogger::new(Box::new(std::io::sink()))
    }

    fn registry() -> JobRegistry {
        JobRegistry::builder()
            .register("echo", job_fn(|ctx: JobContext| async move {
                anyhow::ensure!(ctx.meta_data == r#"{"n":1}"#, "unexpected metadata");
                Ok(())
            }))
            .build()
    }

    #[tokio::test]
    async fn test_execute_entry_exit_codes() {
        let registry = registry();
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            execute_entry(&registry, "echo", id, r#"{"n":1}"#.into(), quiet()).await,
            EXIT_SUCCESS
        );
        assert_eq!(
            execute_entry(&registry, "echo", id, "{}".into(), quiet()).await,
            EXIT_JOB_FAILED
        );
        assert_eq!(
            execute_entry(&registry, "missing", id, "{}".into(), quiet()).await,
            EXIT_BAD_INVOCATION
        );
    }

    #[test]
    fn test_missing_job_argument_is_bad_invocation() {
        let code = run_worker_entry(&registry(), vec!["/bin/worker".to_string()]);
        assert_eq!(code, EXIT_BAD_INVOCATION);
    }
}
