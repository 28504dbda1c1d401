//! In-memory task store.
//!
//! A single `parking_lot::Mutex` guards both tables, so every conditional
//! update is atomic with respect to concurrent claimers sharing the store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::model::{
    CandidateTask, Job, JobId, NewJob, NewTask, Task, TaskFilter, TaskId, TaskUpdate,
};
use crate::core::{SchedulerError, TaskStatus, TaskStore};

/// Job and task tables with the store semantics, shared by the in-memory and
/// file-backed adapters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct StoreTables {
    pub(crate) jobs: HashMap<JobId, Job>,
    pub(crate) tasks: HashMap<TaskId, Task>,
}

impl StoreTables {
    pub(crate) fn insert_job(&mut self, new: NewJob) -> Result<Job, SchedulerError> {
        new.validate()?;
        if self.job_by_name(&new.name).is_some() {
            return Err(SchedulerError::InvalidJob(format!(
                "job `{}` is already registered",
                new.name
            )));
        }
        let job = Job {
            id: Uuid::new_v4(),
            name: new.name,
            script_path: new.script_path,
            required_slots: new.required_slots,
            maximum_execution_time: new.maximum_execution_time,
        };
        self.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    pub(crate) fn job_by_name(&self, name: &str) -> Option<&Job> {
        self.jobs.values().find(|job| job.name == name)
    }

    pub(crate) fn insert_task(&mut self, new: NewTask, now_ms: u128) -> Result<Task, SchedulerError> {
        new.validate()?;
        if !self.jobs.contains_key(&new.job) {
            return Err(SchedulerError::JobNotFound(new.job.to_string()));
        }
        if let Some(predecessor) = new.start_after {
            if !self.tasks.contains_key(&predecessor) {
                return Err(SchedulerError::TaskNotFound(predecessor.to_string()));
            }
        }
        if let Some(parent) = new.parent() {
            if !self.tasks.contains_key(&parent) {
                return Err(SchedulerError::TaskNotFound(parent.to_string()));
            }
        }
        let task = Task::from_new(new, now_ms);
        self.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn is_candidate(&self, task: &Task, now_ms: u128) -> bool {
        if task.status != TaskStatus::Pending {
            return false;
        }
        let due = task.start_at_ms.is_some_and(|start| start <= now_ms);
        let released = task.start_after.is_some_and(|predecessor| {
            self.tasks
                .get(&predecessor)
                .is_some_and(|p| p.status.is_terminal())
        });
        due || released
    }

    pub(crate) fn candidates(&self, now_ms: u128) -> Vec<CandidateTask> {
        let mut candidates: Vec<CandidateTask> = self
            .tasks
            .values()
            .filter(|task| self.is_candidate(task, now_ms))
            .filter_map(|task| {
                let job = self.jobs.get(&task.job)?;
                Some(CandidateTask {
                    task: task.clone(),
                    job: job.clone(),
                })
            })
            .collect();
        candidates.sort_by_key(|c| c.task.order_key());
        candidates
    }

    pub(crate) fn running(&self) -> Vec<Task> {
        let mut running: Vec<Task> = self
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::InProgress)
            .cloned()
            .collect();
        running.sort_by_key(Task::order_key);
        running
    }

    /// Update the first matching task in claim order.
    pub(crate) fn update_matching(&mut self, filter: &TaskFilter, update: &TaskUpdate) -> bool {
        let target = match filter.id {
            Some(id) => self.tasks.get(&id).filter(|t| filter.matches(t)).map(|t| t.id),
            None => self
                .tasks
                .values()
                .filter(|t| filter.matches(t))
                .min_by_key(|t| t.order_key())
                .map(|t| t.id),
        };
        let Some(id) = target else {
            return false;
        };
        if let Some(task) = self.tasks.get_mut(&id) {
            update.apply(task);
            return true;
        }
        false
    }

    pub(crate) fn clear(&mut self) {
        self.jobs.clear();
        self.tasks.clear();
    }
}

/// In-memory task store for development, testing, and single-process
/// deployments where several scheduler instances share one `Arc`.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tables: Mutex<StoreTables>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored task, in claim order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        let tables = self.tables.lock();
        let mut tasks: Vec<Task> = tables.tasks.values().cloned().collect();
        tasks.sort_by_key(Task::order_key);
        tasks
    }

    /// Insert a task record as-is, bypassing validation.
    ///
    /// Used to seed fixtures such as tasks left `IN_PROGRESS` by a crashed
    /// instance.
    pub fn insert_raw_task(&self, task: Task) {
        self.tables.lock().tasks.insert(task.id, task);
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_job(&self, job: NewJob) -> Result<Job, SchedulerError> {
        self.tables.lock().insert_job(job)
    }

    async fn view_job(&self, id: JobId) -> Result<Option<Job>, SchedulerError> {
        Ok(self.tables.lock().jobs.get(&id).cloned())
    }

    async fn view_job_by_name(&self, name: &str) -> Result<Option<Job>, SchedulerError> {
        Ok(self.tables.lock().job_by_name(name).cloned())
    }

    async fn create_task(&self, task: NewTask, now_ms: u128) -> Result<Task, SchedulerError> {
        self.tables.lock().insert_task(task, now_ms)
    }

    async fn view_task(&self, id: TaskId) -> Result<Option<Task>, SchedulerError> {
        Ok(self.tables.lock().tasks.get(&id).cloned())
    }

    async fn reset(&self) -> Result<(), SchedulerError> {
        self.tables.lock().clear();
        Ok(())
    }

    async fn get_candidate_pending_tasks(
        &self,
        now_ms: u128,
    ) -> Result<Vec<CandidateTask>, SchedulerError> {
        Ok(self.tables.lock().candidates(now_ms))
    }

    async fn get_running_tasks(&self) -> Result<Vec<Task>, SchedulerError> {
        Ok(self.tables.lock().running())
    }

    async fn update_matching_task(
        &self,
        filter: &TaskFilter,
        update: &TaskUpdate,
    ) -> Result<bool, SchedulerError> {
        Ok(self.tables.lock().update_matching(filter, update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SlotSize;

    fn new_job(name: &str) -> NewJob {
        NewJob {
            name: name.into(),
            script_path: format!("/usr/bin/worker {name}"),
            required_slots: SlotSize::S256,
            maximum_execution_time: 30,
        }
    }

    #[tokio::test]
    async fn test_create_job_rejects_duplicate_names() {
        let store = InMemoryTaskStore::new();
        store.create_job(new_job("report")).await.unwrap();
        let err = store.create_job(new_job("report")).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidJob(_)));
        assert!(store.view_job_by_name("report").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_task_checks_references() {
        let store = InMemoryTaskStore::new();
        let missing = store.create_task(NewTask::at(Uuid::new_v4(), 0), 1).await;
        assert!(matches!(missing, Err(SchedulerError::JobNotFound(_))));

        let job = store.create_job(new_job("report")).await.unwrap();
        let orphan = store.create_task(NewTask::after(job.id, Uuid::new_v4()), 1).await;
        assert!(matches!(orphan, Err(SchedulerError::TaskNotFound(_))));

        let task = store.create_task(NewTask::at(job.id, 5), 1).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.meta_data, "{}");
    }

    #[tokio::test]
    async fn test_candidates_respect_start_at_and_order() {
        let store = InMemoryTaskStore::new();
        let job = store.create_job(new_job("report")).await.unwrap();
        let late = store.create_task(NewTask::at(job.id, 300), 1).await.unwrap();
        let early = store.create_task(NewTask::at(job.id, 100), 2).await.unwrap();
        store.create_task(NewTask::at(job.id, 10_000), 3).await.unwrap();

        let ids: Vec<TaskId> = store
            .get_candidate_pending_tasks(500)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.task.id)
            .collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[tokio::test]
    async fn test_update_matching_is_conditional() {
        let store = InMemoryTaskStore::new();
        let job = store.create_job(new_job("report")).await.unwrap();
        let task = store.create_task(NewTask::at(job.id, 0), 1).await.unwrap();

        let claim = TaskFilter::by_id(task.id).with_status(TaskStatus::Pending);
        assert!(store
            .update_matching_task(&claim, &TaskUpdate::claim("a", 10))
            .await
            .unwrap());
        assert!(!store
            .update_matching_task(&claim, &TaskUpdate::claim("b", 11))
            .await
            .unwrap());

        let stored = store.view_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.run_by.as_deref(), Some("a"));
        assert_eq!(stored.started_at_ms, Some(10));
        assert_eq!(store.get_running_tasks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let store = InMemoryTaskStore::new();
        let job = store.create_job(new_job("report")).await.unwrap();
        store.create_task(NewTask::at(job.id, 0), 1).await.unwrap();
        store.reset().await.unwrap();
        assert!(store.tasks().is_empty());
        assert!(store.view_job(job.id).await.unwrap().is_none());
    }
}
