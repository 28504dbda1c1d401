//! Per-task log files and best-effort delivery to a bucket.

use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{SchedulerError, TaskId};

/// Object storage sink for shipped logs.
#[async_trait]
pub trait Bucket: Send + Sync + 'static {
    /// Store `bytes` at `destination`.
    async fn upload(
        &self,
        content_type: &str,
        destination: &str,
        bytes: Vec<u8>,
    ) -> Result<(), SchedulerError>;
}

/// Content type used for shipped task logs.
pub const LOG_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Creates per-task log files and ships them when the worker exits.
#[derive(Clone)]
pub struct LogShipper {
    logs_path: PathBuf,
    bucket: Option<Arc<dyn Bucket>>,
    prefix: String,
}

impl LogShipper {
    /// Shipper writing files under `logs_path` without remote delivery.
    pub fn new(logs_path: impl AsRef<Path>) -> Self {
        Self {
            logs_path: logs_path.as_ref().to_path_buf(),
            bucket: None,
            prefix: "logs".into(),
        }
    }

    /// Deliver finished logs to `bucket`.
    #[must_use]
    pub fn with_bucket(mut self, bucket: Arc<dyn Bucket>) -> Self {
        self.bucket = Some(bucket);
        self
    }

    /// Destination prefix inside the bucket (default `logs`).
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Directory holding the log files.
    #[must_use]
    pub fn logs_path(&self) -> &Path {
        &self.logs_path
    }

    /// `<logsPath>/<taskId>.log`.
    #[must_use]
    pub fn log_file_path(&self, task_id: TaskId) -> PathBuf {
        self.logs_path.join(format!("{task_id}.log"))
    }

    /// Bucket destination for a task's log.
    #[must_use]
    pub fn destination(&self, task_id: TaskId) -> String {
        if self.prefix.is_empty() {
            format!("{task_id}.log")
        } else {
            format!("{}/{task_id}.log", self.prefix.trim_end_matches('/'))
        }
    }

    /// Create or truncate the task's log file.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::LogShipping` when the directory or file cannot
    /// be created.
    pub fn open(&self, task_id: TaskId) -> Result<File, SchedulerError> {
        create_dir_all(&self.logs_path).map_err(|e| {
            SchedulerError::LogShipping(format!("{}: {e}", self.logs_path.display()))
        })?;
        let path = self.log_file_path(task_id);
        File::create(&path)
            .map_err(|e| SchedulerError::LogShipping(format!("{}: {e}", path.display())))
    }

    /// Upload the task's log if a bucket is configured.
    ///
    /// Failures are logged and swallowed; task status never depends on log
    /// delivery. Returns whether the log was uploaded.
    pub async fn ship(&self, task_id: TaskId) -> bool {
        let Some(bucket) = &self.bucket else {
            return false;
        };
        let path = self.log_file_path(task_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(task_id = %task_id, path = %path.display(), error = %e, "failed to read task log for shipping");
                return false;
            }
        };
        let destination = self.destination(task_id);
        match bucket.upload(LOG_CONTENT_TYPE, &destination, bytes).await {
            Ok(()) => {
                tracing::debug!(task_id = %task_id, destination = %destination, "task log shipped");
                true
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, destination = %destination, error = %e, "failed to ship task log");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct RejectingBucket;

    #[async_trait]
    impl Bucket for RejectingBucket {
        async fn upload(&self, _: &str, _: &str, _: Vec<u8>) -> Result<(), SchedulerError> {
            Err(SchedulerError::LogShipping("bucket offline".into()))
        }
    }

    fn temp_logs() -> PathBuf {
        std::env::temp_dir().join(format!("pjs-logs-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_open_truncates_existing_log() {
        let shipper = LogShipper::new(temp_logs());
        let id = uuid::Uuid::new_v4();
        {
            let mut file = shipper.open(id).unwrap();
            file.write_all(b"first run").unwrap();
        }
        shipper.open(id).unwrap();
        let content = std::fs::read(shipper.log_file_path(id)).unwrap();
        assert!(content.is_empty());
    }

    #[test]
    fn test_destination_prefix() {
        let id = uuid::Uuid::new_v4();
        let shipper = LogShipper::new(temp_logs());
        assert_eq!(shipper.destination(id), format!("logs/{id}.log"));
        let bare = shipper.with_prefix("");
        assert_eq!(bare.destination(id), format!("{id}.log"));
    }

    #[tokio::test]
    async fn test_ship_without_bucket_is_noop() {
        let shipper = LogShipper::new(temp_logs());
        let id = uuid::Uuid::new_v4();
        shipper.open(id).unwrap();
        assert!(!shipper.ship(id).await);
    }

    #[tokio::test]
    async fn test_ship_failure_is_swallowed() {
        let shipper = LogShipper::new(temp_logs()).with_bucket(Arc::new(RejectingBucket));
        let id = uuid::Uuid::new_v4();
        shipper.open(id).unwrap();
        assert!(!shipper.ship(id).await);
    }
}
