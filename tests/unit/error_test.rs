//! Tests for error types

use prometheus_job_scheduler::core::SchedulerError;

#[test]
fn test_store_unavailable_error() {
    let err = SchedulerError::StoreUnavailable("connection refused".to_string());
    assert_eq!(format!("{err}"), "store unavailable: connection refused");
    assert!(err.is_transient());
}

#[test]
fn test_invalid_task_error() {
    let err = SchedulerError::InvalidTask("recurrence must be greater than 0".to_string());
    assert_eq!(format!("{err}"), "invalid task: recurrence must be greater than 0");
    assert!(!err.is_transient());
}

#[test]
fn test_worker_launch_error() {
    let err = SchedulerError::WorkerLaunch("no such file".to_string());
    assert_eq!(format!("{err}"), "worker launch failed: no such file");
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{err}"), "backend error: connection failed");
    assert!(!err.is_transient());
}

#[test]
fn test_errors_convert_into_anyhow() {
    fn job_body() -> prometheus_job_scheduler::core::AppResult<()> {
        Err(SchedulerError::UnknownJob("report".into()))?;
        Ok(())
    }
    let err = job_body().unwrap_err();
    assert_eq!(err.to_string(), "unknown job: report");
}
