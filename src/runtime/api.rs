//! Host-facing administrative API: job registration, task submission and
//! introspection.
//!
//! These operations are used by host applications, never by the scheduler
//! loop itself.

use serde::{Deserialize, Serialize};

use crate::core::{
    Job, NewJob, NewTask, Scheduler, SchedulerError, SchedulerSnapshot, SchedulerState, Spawn,
    Task, TaskFilter, TaskId, TaskStatus, TaskStore, TaskUpdate,
};

/// Task submission payload, addressed by job name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSubmission {
    /// Registered job name.
    pub job: String,
    /// Earliest execution time in milliseconds since epoch.
    #[serde(default)]
    pub start_at: Option<u128>,
    /// Predecessor task that must be terminal first.
    #[serde(default)]
    pub start_after: Option<TaskId>,
    /// Recurrence interval in seconds.
    #[serde(default)]
    pub recurrence: Option<u64>,
    /// JSON-encoded metadata passed to the job.
    #[serde(default)]
    pub meta_data: Option<String>,
}

/// Task status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    /// Task identifier.
    pub task_id: TaskId,
    /// Current status.
    pub status: TaskStatus,
    /// Instance that ran or is running the task.
    pub run_by: Option<String>,
    /// Failure detail.
    pub reason: Option<String>,
}

impl From<&Task> for TaskStatusResponse {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            run_by: task.run_by.clone(),
            reason: task.error.clone(),
        }
    }
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag: the instance is initialized and not stopped.
    pub ok: bool,
    /// Lifecycle state.
    pub state: SchedulerState,
    /// Free slot units.
    pub free_slots: u32,
    /// In-flight executions.
    pub in_flight: usize,
}

/// Register a job, or return the stored job when one with the same name
/// exists. Stored jobs are immutable.
///
/// # Errors
///
/// Returns `SchedulerError::InvalidJob` on validation failure, or when a job
/// with the same name but a different definition is already stored.
pub async fn register_job(store: &dyn TaskStore, job: NewJob) -> Result<Job, SchedulerError> {
    job.validate()?;
    if let Some(existing) = store.view_job_by_name(&job.name).await? {
        if existing.script_path == job.script_path
            && existing.required_slots == job.required_slots
            && existing.maximum_execution_time == job.maximum_execution_time
        {
            return Ok(existing);
        }
        return Err(SchedulerError::InvalidJob(format!(
            "job `{}` is already registered with a different definition",
            job.name
        )));
    }
    store.create_job(job).await
}

/// Create a `PENDING` task for the named job.
///
/// # Errors
///
/// Returns `SchedulerError::JobNotFound` for an unknown job name and the
/// store's validation errors otherwise.
pub async fn submit_task(
    store: &dyn TaskStore,
    req: TaskSubmission,
    now_ms: u128,
) -> Result<Task, SchedulerError> {
    let job = store
        .view_job_by_name(&req.job)
        .await?
        .ok_or_else(|| SchedulerError::JobNotFound(req.job.clone()))?;
    let task = NewTask {
        job: job.id,
        start_at_ms: req.start_at,
        start_after: req.start_after,
        recurrence_secs: req.recurrence,
        meta_data: req.meta_data,
        parent: None,
    };
    let task = store.create_task(task, now_ms).await?;
    tracing::info!(task_id = %task.id, job = %job.name, "task submitted");
    Ok(task)
}

/// Withdraw a task that has not been claimed yet.
///
/// Returns `false` when the task is no longer `PENDING`.
///
/// # Errors
///
/// Returns `SchedulerError::TaskNotFound` for an unknown id and store
/// failures otherwise.
pub async fn cancel_task(
    store: &dyn TaskStore,
    task_id: TaskId,
    now_ms: u128,
) -> Result<bool, SchedulerError> {
    if store.view_task(task_id).await?.is_none() {
        return Err(SchedulerError::TaskNotFound(task_id.to_string()));
    }
    let filter = TaskFilter::by_id(task_id).with_status(TaskStatus::Pending);
    let update = TaskUpdate::finish(TaskStatus::Canceled, now_ms, None);
    let canceled = store.update_matching_task(&filter, &update).await?;
    if canceled {
        tracing::info!(task_id = %task_id, "task canceled");
    }
    Ok(canceled)
}

/// Current status of a task.
///
/// # Errors
///
/// Returns `SchedulerError::TaskNotFound` for an unknown id.
pub async fn view_task(
    store: &dyn TaskStore,
    task_id: TaskId,
) -> Result<TaskStatusResponse, SchedulerError> {
    store
        .view_task(task_id)
        .await?
        .map(|task| TaskStatusResponse::from(&task))
        .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))
}

/// Point-in-time view of a scheduler instance.
pub fn snapshot<S>(scheduler: &Scheduler<S>) -> SchedulerSnapshot
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    scheduler.snapshot()
}

/// Return a health payload.
pub fn health<S>(scheduler: &Scheduler<S>) -> Health
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    let state = scheduler.state();
    Health {
        ok: matches!(state, SchedulerState::Running | SchedulerState::Draining),
        state,
        free_slots: scheduler.free_slots(),
        in_flight: scheduler.in_flight_count(),
    }
}
