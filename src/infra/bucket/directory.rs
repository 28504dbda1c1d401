//! Directory-backed bucket adapter.
//!
//! Objects are written below a root directory using their destination path;
//! the content type is not persisted.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::core::{Bucket, SchedulerError};

/// Bucket that stores objects as files under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryBucket {
    root: PathBuf,
}

impl DirectoryBucket {
    /// Create a bucket rooted at `root`. The directory is created on first upload.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory of the bucket.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a destination below the root, refusing absolute paths and `..`.
    fn resolve(&self, destination: &str) -> Result<PathBuf, SchedulerError> {
        let relative = Path::new(destination);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || destination.is_empty() {
            return Err(SchedulerError::LogShipping(format!(
                "destination `{destination}` must be a relative path inside the bucket"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Bucket for DirectoryBucket {
    async fn upload(
        &self,
        _content_type: &str,
        destination: &str,
        bytes: Vec<u8>,
    ) -> Result<(), SchedulerError> {
        let target = self.resolve(destination)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SchedulerError::LogShipping(e.to_string()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| SchedulerError::LogShipping(e.to_string()))
    }
}
