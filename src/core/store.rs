//! Task store contract.
//!
//! The store is the only state shared between scheduler instances. Every
//! mutation of a task's system-managed fields goes through
//! [`TaskStore::update_matching_task`], a compare-and-swap on the filter
//! conditions; there is no distributed lock.

use async_trait::async_trait;

use crate::core::model::{
    CandidateTask, Job, JobId, NewJob, NewTask, Task, TaskFilter, TaskId, TaskStatus, TaskUpdate,
};
use crate::core::SchedulerError;

/// Abstraction over the persistent datastore shared by scheduler instances.
///
/// Adapters report transport failures as `SchedulerError::StoreUnavailable`.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Register a job. Names are unique within a store.
    async fn create_job(&self, job: NewJob) -> Result<Job, SchedulerError>;

    /// Look a job up by id.
    async fn view_job(&self, id: JobId) -> Result<Option<Job>, SchedulerError>;

    /// Look a job up by its registered name.
    async fn view_job_by_name(&self, name: &str) -> Result<Option<Job>, SchedulerError>;

    /// Create a `PENDING` task after validating it.
    ///
    /// This is the single creation path for both externally-submitted tasks
    /// and recurrence occurrences.
    async fn create_task(&self, task: NewTask, now_ms: u128) -> Result<Task, SchedulerError>;

    /// Look a task up by id.
    async fn view_task(&self, id: TaskId) -> Result<Option<Task>, SchedulerError>;

    /// Remove every job and task.
    async fn reset(&self) -> Result<(), SchedulerError>;

    /// Pending tasks whose start condition holds at `now_ms`, in claim order.
    ///
    /// A task is a candidate when it is `PENDING` and either its `startAt` is
    /// not after `now_ms` or its `startAfter` task is terminal.
    async fn get_candidate_pending_tasks(
        &self,
        now_ms: u128,
    ) -> Result<Vec<CandidateTask>, SchedulerError>;

    /// Tasks currently `IN_PROGRESS`, on any instance.
    async fn get_running_tasks(&self) -> Result<Vec<Task>, SchedulerError>;

    /// Apply `update` to one task matching `filter`.
    ///
    /// Returns `false` when no task matched at update time; losing a race is
    /// not an error.
    async fn update_matching_task(
        &self,
        filter: &TaskFilter,
        update: &TaskUpdate,
    ) -> Result<bool, SchedulerError>;

    /// Claim up to `limit` candidates for `instance_id`.
    ///
    /// Each claim is a conditional update on `_status = PENDING`; candidates
    /// taken by another instance in the meantime are skipped, so the result
    /// may be shorter than `limit`.
    ///
    /// A store error stops claiming. Tasks already claimed are still
    /// returned; the error is only propagated when nothing was claimed.
    async fn claim_candidate_tasks(
        &self,
        instance_id: &str,
        limit: usize,
        now_ms: u128,
    ) -> Result<Vec<Task>, SchedulerError> {
        let mut claimed = Vec::new();
        if limit == 0 {
            return Ok(claimed);
        }
        let update = TaskUpdate::claim(instance_id, now_ms);
        for candidate in self.get_candidate_pending_tasks(now_ms).await? {
            let filter = TaskFilter::by_id(candidate.task.id).with_status(TaskStatus::Pending);
            let won = match self.update_matching_task(&filter, &update).await {
                Ok(won) => won,
                Err(e) if claimed.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        instance = %instance_id,
                        task_id = %candidate.task.id,
                        claimed = claimed.len(),
                        error = %e,
                        "claim interrupted by store error"
                    );
                    break;
                }
            };
            if won {
                let mut task = candidate.task;
                update.apply(&mut task);
                claimed.push(task);
                if claimed.len() >= limit {
                    break;
                }
            }
        }
        Ok(claimed)
    }
}
