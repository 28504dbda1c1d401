//! File-backed task store.
//!
//! Persists the tables as a JSON-lines snapshot with the same semantics as
//! [`InMemoryTaskStore`](super::InMemoryTaskStore). Every operation takes an
//! advisory lock on a sibling `<file>.lock` (shared for reads, exclusive for
//! mutations) and reloads the snapshot under it, so several handles or
//! processes on one host can share the file. A mutation is read, applied and
//! written back while the exclusive lock is held, which keeps conditional
//! updates atomic across all of them.
//!
//! An instance restarted against the same file finds the tasks it left
//! `IN_PROGRESS` and can fail them. Instances on other machines need an
//! adapter for a networked datastore.

use std::fs::{create_dir_all, rename, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use super::memory::StoreTables;
use crate::core::model::{
    CandidateTask, Job, JobId, NewJob, NewTask, Task, TaskFilter, TaskId, TaskUpdate,
};
use crate::core::{SchedulerError, TaskStore};

/// How long an operation waits for the snapshot lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_MAX_BACKOFF: Duration = Duration::from_millis(100);

/// One line of the snapshot file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StoreRecord {
    Job(Job),
    Task(Task),
}

/// Advisory lock on the snapshot, released on drop.
struct SnapshotLock {
    file: File,
}

impl SnapshotLock {
    fn try_acquire(path: &Path, exclusive: bool) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if exclusive {
            FileExt::try_lock_exclusive(&file)?;
        } else {
            FileExt::try_lock_shared(&file)?;
        }
        Ok(Self { file })
    }

    fn acquire_blocking(path: &Path, exclusive: bool) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if exclusive {
            FileExt::lock_exclusive(&file)?;
        } else {
            FileExt::lock_shared(&file)?;
        }
        Ok(Self { file })
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Task store persisted to a JSON-lines file.
#[derive(Debug)]
pub struct FileTaskStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileTaskStore {
    /// Open (or create) a store persisted at `path`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::StoreUnavailable` when the file cannot be read
    /// and `SchedulerError::Backend` when a line cannot be decoded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_dir_all(dir).map_err(|e| SchedulerError::StoreUnavailable(e.to_string()))?;
        }
        let store = Self {
            lock_path: path.with_extension("jsonl.lock"),
            path,
        };
        let tables = {
            let _lock = SnapshotLock::acquire_blocking(&store.lock_path, false)
                .map_err(|e| store.unavailable(&e))?;
            store.load_from_disk()?
        };
        tracing::debug!(
            path = %store.path.display(),
            jobs = tables.jobs.len(),
            tasks = tables.tasks.len(),
            "file task store opened"
        );
        Ok(store)
    }

    /// Location of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, e: &std::io::Error) -> SchedulerError {
        SchedulerError::StoreUnavailable(format!("{}: {e}", self.path.display()))
    }

    /// Wait for the snapshot lock, backing off while another holder has it.
    async fn lock(&self, exclusive: bool) -> Result<SnapshotLock, SchedulerError> {
        let started = tokio::time::Instant::now();
        let mut backoff = Duration::from_millis(1);
        loop {
            match SnapshotLock::try_acquire(&self.lock_path, exclusive) {
                Ok(lock) => return Ok(lock),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= LOCK_TIMEOUT {
                        return Err(SchedulerError::StoreUnavailable(format!(
                            "{}: timed out waiting for the store lock",
                            self.path.display()
                        )));
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(LOCK_MAX_BACKOFF);
                }
                Err(e) => return Err(self.unavailable(&e)),
            }
        }
    }

    fn load_from_disk(&self) -> Result<StoreTables, SchedulerError> {
        let mut tables = StoreTables::default();
        if !self.path.exists() {
            return Ok(tables);
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|e| self.unavailable(&e))?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| self.unavailable(&e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: StoreRecord =
                serde_json::from_str(&line).map_err(|e| SchedulerError::Backend(e.to_string()))?;
            match record {
                StoreRecord::Job(job) => {
                    tables.jobs.insert(job.id, job);
                }
                StoreRecord::Task(task) => {
                    tables.tasks.insert(task.id, task);
                }
            }
        }
        Ok(tables)
    }

    /// Write the snapshot to a sibling temp file and move it into place.
    fn rewrite_disk(&self, tables: &StoreTables) -> Result<(), SchedulerError> {
        let tmp_path = self.path.with_extension("jsonl.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| self.unavailable(&e))?;
        let mut writer = BufWriter::new(file);
        let jobs = tables.jobs.values().cloned().map(StoreRecord::Job);
        let tasks = tables.tasks.values().cloned().map(StoreRecord::Task);
        for record in jobs.chain(tasks) {
            let line =
                serde_json::to_string(&record).map_err(|e| SchedulerError::Backend(e.to_string()))?;
            writeln!(writer, "{line}").map_err(|e| self.unavailable(&e))?;
        }
        writer.flush().map_err(|e| self.unavailable(&e))?;
        rename(&tmp_path, &self.path).map_err(|e| self.unavailable(&e))
    }

    async fn read<T>(&self, op: impl FnOnce(&StoreTables) -> T) -> Result<T, SchedulerError> {
        let _lock = self.lock(false).await?;
        let tables = self.load_from_disk()?;
        Ok(op(&tables))
    }

    /// Apply a mutation to the current snapshot and persist it. Nothing is
    /// written when `op` fails.
    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut StoreTables) -> Result<T, SchedulerError>,
    ) -> Result<T, SchedulerError> {
        let _lock = self.lock(true).await?;
        let mut tables = self.load_from_disk()?;
        let out = op(&mut tables)?;
        self.rewrite_disk(&tables)?;
        Ok(out)
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn create_job(&self, job: NewJob) -> Result<Job, SchedulerError> {
        self.mutate(|tables| tables.insert_job(job)).await
    }

    async fn view_job(&self, id: JobId) -> Result<Option<Job>, SchedulerError> {
        self.read(|tables| tables.jobs.get(&id).cloned()).await
    }

    async fn view_job_by_name(&self, name: &str) -> Result<Option<Job>, SchedulerError> {
        self.read(|tables| tables.job_by_name(name).cloned()).await
    }

    async fn create_task(&self, task: NewTask, now_ms: u128) -> Result<Task, SchedulerError> {
        self.mutate(|tables| tables.insert_task(task, now_ms)).await
    }

    async fn view_task(&self, id: TaskId) -> Result<Option<Task>, SchedulerError> {
        self.read(|tables| tables.tasks.get(&id).cloned()).await
    }

    async fn reset(&self) -> Result<(), SchedulerError> {
        self.mutate(|tables| {
            tables.clear();
            Ok(())
        })
        .await
    }

    async fn get_candidate_pending_tasks(
        &self,
        now_ms: u128,
    ) -> Result<Vec<CandidateTask>, SchedulerError> {
        self.read(|tables| tables.candidates(now_ms)).await
    }

    async fn get_running_tasks(&self) -> Result<Vec<Task>, SchedulerError> {
        self.read(StoreTables::running).await
    }

    async fn update_matching_task(
        &self,
        filter: &TaskFilter,
        update: &TaskUpdate,
    ) -> Result<bool, SchedulerError> {
        self.mutate(|tables| Ok(tables.update_matching(filter, update))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SlotSize, TaskStatus};

    fn temp_store_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("pjs-file-store-{}", uuid::Uuid::new_v4()))
            .join(format!("{name}.jsonl"))
    }

    fn report_job(name: &str) -> NewJob {
        NewJob {
            name: name.into(),
            script_path: format!("/usr/bin/worker {name}"),
            required_slots: SlotSize::S512,
            maximum_execution_time: 60,
        }
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let path = temp_store_path("reopen");
        let task_id = {
            let store = FileTaskStore::open(&path).unwrap();
            let job = store.create_job(report_job("report")).await.unwrap();
            let task = store.create_task(NewTask::at(job.id, 0), 1).await.unwrap();
            let filter = TaskFilter::by_id(task.id).with_status(TaskStatus::Pending);
            assert!(store
                .update_matching_task(&filter, &TaskUpdate::claim("alpha", 5))
                .await
                .unwrap());
            task.id
        };

        let reopened = FileTaskStore::open(&path).unwrap();
        let task = reopened.view_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.run_by.as_deref(), Some("alpha"));
        assert_eq!(task.created_at_ms, 1);
        assert_eq!(task.start_at_ms, Some(0));
        assert_eq!(task.started_at_ms, Some(5));
        let job = reopened.view_job_by_name("report").await.unwrap().unwrap();
        assert_eq!(job.required_slots, SlotSize::S512);
    }

    #[tokio::test]
    async fn test_large_timestamps_survive_reopen() {
        let path = temp_store_path("wide");
        let store = FileTaskStore::open(&path).unwrap();
        let job = store.create_job(report_job("report")).await.unwrap();
        let far = u128::from(u64::MAX) + 7;
        let task = store.create_task(NewTask::at(job.id, far), far).await.unwrap();

        let reopened = FileTaskStore::open(&path).unwrap();
        let stored = reopened.view_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.start_at_ms, Some(far));
        assert_eq!(stored.created_at_ms, far);
    }

    #[tokio::test]
    async fn test_handles_on_one_file_see_each_other() {
        let path = temp_store_path("shared");
        let a = FileTaskStore::open(&path).unwrap();
        let b = FileTaskStore::open(&path).unwrap();

        let job = a.create_job(report_job("report")).await.unwrap();
        let task = a.create_task(NewTask::at(job.id, 0), 0).await.unwrap();
        b.create_job(report_job("cleanup")).await.unwrap();

        let candidates = b.get_candidate_pending_tasks(10).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].task.id, task.id);

        let filter = TaskFilter::by_id(task.id).with_status(TaskStatus::Pending);
        assert!(b
            .update_matching_task(&filter, &TaskUpdate::claim("beta", 10))
            .await
            .unwrap());
        assert!(!a
            .update_matching_task(&filter, &TaskUpdate::claim("alpha", 11))
            .await
            .unwrap());

        let reopened = FileTaskStore::open(&path).unwrap();
        assert!(reopened.view_job_by_name("report").await.unwrap().is_some());
        assert!(reopened.view_job_by_name("cleanup").await.unwrap().is_some());
        let stored = reopened.view_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.run_by.as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn test_failed_validation_leaves_file_untouched() {
        let path = temp_store_path("invalid");
        let store = FileTaskStore::open(&path).unwrap();
        let err = store
            .create_task(NewTask::at(uuid::Uuid::new_v4(), 0), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::JobNotFound(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_held_lock_delays_mutations() {
        let path = temp_store_path("locked");
        let store = FileTaskStore::open(&path).unwrap();
        let held = SnapshotLock::acquire_blocking(&store.lock_path, true).unwrap();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(held);
        });
        let started = std::time::Instant::now();
        store.create_job(report_job("report")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
        release.await.unwrap();
    }
}
