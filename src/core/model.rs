//! Job and task records shared by the store contract and the scheduler loop.
//!
//! Field names of persisted records follow the store layout: system-managed
//! task fields are prefixed with an underscore (`_status`, `_runBy`,
//! `_startedAt`, `_endedAt`, `_parent`) and are only changed through
//! [`TaskUpdate`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::SchedulerError;

/// Identifier of a task record.
pub type TaskId = Uuid;

/// Identifier of a job record.
pub type JobId = Uuid;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed and running on one scheduler instance.
    InProgress,
    /// Withdrawn before it was claimed.
    Canceled,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully (error, timeout, launch failure, recovery).
    Failed,
}

impl TaskStatus {
    /// Terminal statuses release `startAfter` dependents and are never left.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Completed | Self::Failed)
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Canceled => "CANCELED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "CANCELED" => Ok(Self::Canceled),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(SchedulerError::Backend(format!("unknown task status `{other}`"))),
        }
    }
}

/// Slot requirement of a job, drawn from a fixed set of sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SlotSize {
    /// 256 slots.
    S256,
    /// 512 slots.
    S512,
    /// 1024 slots.
    S1024,
    /// 2048 slots.
    S2048,
    /// 4096 slots.
    S4096,
}

impl SlotSize {
    /// Every accepted size, smallest first.
    pub const ALL: [Self; 5] = [Self::S256, Self::S512, Self::S1024, Self::S2048, Self::S4096];

    /// Number of slot units consumed while a task of this size runs.
    #[must_use]
    pub const fn units(self) -> u32 {
        match self {
            Self::S256 => 256,
            Self::S512 => 512,
            Self::S1024 => 1024,
            Self::S2048 => 2048,
            Self::S4096 => 4096,
        }
    }
}

impl TryFrom<u32> for SlotSize {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|size| size.units() == value)
            .ok_or_else(|| format!("unsupported slot size {value}; expected one of 256, 512, 1024, 2048, 4096"))
    }
}

impl From<SlotSize> for u32 {
    fn from(size: SlotSize) -> Self {
        size.units()
    }
}

/// A registered unit-of-work template. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Registered job name.
    pub name: String,
    /// Entry point locator, `<path> <jobName>`.
    pub script_path: String,
    /// Slot units consumed by one execution.
    pub required_slots: SlotSize,
    /// Execution budget in seconds before forced termination.
    pub maximum_execution_time: u64,
}

impl Job {
    /// Program part of the script path (everything before the job name).
    #[must_use]
    pub fn program(&self) -> &str {
        split_script_path(&self.script_path).0
    }

    /// Job name part of the script path.
    #[must_use]
    pub fn job_name(&self) -> &str {
        split_script_path(&self.script_path).1
    }

    /// Execution budget in milliseconds.
    #[must_use]
    pub const fn maximum_execution_ms(&self) -> u128 {
        crate::util::clock::secs_to_ms(self.maximum_execution_time)
    }
}

/// Split `<path> <jobName>` on its last whitespace run.
///
/// Paths may contain spaces; the job name never does.
#[must_use]
pub fn split_script_path(script_path: &str) -> (&str, &str) {
    let trimmed = script_path.trim();
    match trimmed.rsplit_once(char::is_whitespace) {
        Some((program, name)) => (program.trim_end(), name),
        None => ("", trimmed),
    }
}

/// Job registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    /// Job name, unique within a store.
    pub name: String,
    /// Entry point locator, `<path> <jobName>`.
    pub script_path: String,
    /// Slot units consumed by one execution.
    pub required_slots: SlotSize,
    /// Execution budget in seconds.
    pub maximum_execution_time: u64,
}

impl NewJob {
    /// Validate the registration request.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidJob` when the name is empty, the script
    /// path does not end in the job name, or the execution budget is zero.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::InvalidJob("job name must not be empty".into()));
        }
        let (program, name) = split_script_path(&self.script_path);
        if program.is_empty() {
            return Err(SchedulerError::InvalidJob(format!(
                "script path `{}` must have the form `<path> <jobName>`",
                self.script_path
            )));
        }
        if name != self.name {
            return Err(SchedulerError::InvalidJob(format!(
                "script path `{}` does not end in job name `{}`",
                self.script_path, self.name
            )));
        }
        if self.maximum_execution_time == 0 {
            return Err(SchedulerError::InvalidJob(
                "maximum execution time must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// A single, schedulable execution instance of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// Job this task executes.
    pub job: JobId,
    /// Lifecycle status.
    #[serde(rename = "_status")]
    pub status: TaskStatus,
    /// Scheduler instance currently or last executing the task.
    #[serde(rename = "_runBy")]
    pub run_by: Option<String>,
    /// Claim time in milliseconds since epoch.
    #[serde(rename = "_startedAt")]
    pub started_at_ms: Option<u128>,
    /// Finalization time in milliseconds since epoch.
    #[serde(rename = "_endedAt")]
    pub ended_at_ms: Option<u128>,
    /// Occurrence that produced this task through recurrence.
    #[serde(rename = "_parent")]
    pub parent: Option<TaskId>,
    /// Failure detail recorded at finalization.
    #[serde(rename = "_error", default)]
    pub error: Option<String>,
    /// Creation time in milliseconds since epoch.
    #[serde(rename = "_createdAt")]
    pub created_at_ms: u128,
    /// Earliest execution time in milliseconds since epoch.
    #[serde(rename = "startAt")]
    pub start_at_ms: Option<u128>,
    /// Predecessor that must reach a terminal status first.
    #[serde(rename = "startAfter")]
    pub start_after: Option<TaskId>,
    /// Seconds between a successful completion and the next occurrence.
    #[serde(rename = "recurrence")]
    pub recurrence_secs: Option<u64>,
    /// JSON-encoded metadata passed verbatim to the job.
    #[serde(rename = "metaData")]
    pub meta_data: String,
}

impl Task {
    /// Ordering key for candidate selection: start time, then id.
    ///
    /// Tasks gated on a predecessor have no start time and use their
    /// creation time instead.
    #[must_use]
    pub fn order_key(&self) -> (u128, TaskId) {
        (self.start_at_ms.unwrap_or(self.created_at_ms), self.id)
    }

    /// Build a stored task from a validated request.
    #[must_use]
    pub fn from_new(new: NewTask, created_at_ms: u128) -> Self {
        Self {
            id: Uuid::new_v4(),
            job: new.job,
            status: TaskStatus::Pending,
            run_by: None,
            started_at_ms: None,
            ended_at_ms: None,
            parent: new.parent,
            error: None,
            created_at_ms,
            start_at_ms: new.start_at_ms,
            start_after: new.start_after,
            recurrence_secs: new.recurrence_secs,
            meta_data: new.meta_data.unwrap_or_else(|| "{}".into()),
        }
    }
}

/// Task creation request.
///
/// Exactly one of `start_at_ms` and `start_after` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    /// Job to execute.
    pub job: JobId,
    /// Earliest execution time in milliseconds since epoch.
    pub start_at_ms: Option<u128>,
    /// Predecessor task.
    pub start_after: Option<TaskId>,
    /// Recurrence interval in seconds.
    pub recurrence_secs: Option<u64>,
    /// JSON-encoded metadata; defaults to `{}`.
    pub meta_data: Option<String>,
    pub(crate) parent: Option<TaskId>,
}

impl NewTask {
    /// Task that becomes eligible at `start_at_ms`.
    #[must_use]
    pub const fn at(job: JobId, start_at_ms: u128) -> Self {
        Self {
            job,
            start_at_ms: Some(start_at_ms),
            start_after: None,
            recurrence_secs: None,
            meta_data: None,
            parent: None,
        }
    }

    /// Task that becomes eligible once `predecessor` is terminal.
    #[must_use]
    pub const fn after(job: JobId, predecessor: TaskId) -> Self {
        Self {
            job,
            start_at_ms: None,
            start_after: Some(predecessor),
            recurrence_secs: None,
            meta_data: None,
            parent: None,
        }
    }

    /// Set the recurrence interval.
    #[must_use]
    pub fn with_recurrence(mut self, secs: u64) -> Self {
        self.recurrence_secs = Some(secs);
        self
    }

    /// Set the JSON-encoded metadata.
    #[must_use]
    pub fn with_meta_data(mut self, meta_data: impl Into<String>) -> Self {
        self.meta_data = Some(meta_data.into());
        self
    }

    /// Occurrence this request was derived from, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    /// Validate the shape of the request.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTask` when both or neither of
    /// `start_at_ms`/`start_after` are set, when the recurrence is zero, or
    /// when the metadata is not valid JSON.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        match (self.start_at_ms, self.start_after) {
            (Some(_), Some(_)) => {
                return Err(SchedulerError::InvalidTask(
                    "startAt and startAfter are mutually exclusive".into(),
                ))
            }
            (None, None) => {
                return Err(SchedulerError::InvalidTask(
                    "one of startAt or startAfter must be set".into(),
                ))
            }
            _ => {}
        }
        if self.recurrence_secs == Some(0) {
            return Err(SchedulerError::InvalidTask(
                "recurrence must be greater than 0".into(),
            ));
        }
        if let Some(meta) = &self.meta_data {
            serde_json::from_str::<serde_json::Value>(meta)
                .map_err(|e| SchedulerError::InvalidTask(format!("metaData is not valid JSON: {e}")))?;
        }
        Ok(())
    }
}

/// Conditions a task must meet to be updated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Match a specific task.
    pub id: Option<TaskId>,
    /// Match the current status.
    pub status: Option<TaskStatus>,
    /// Match the owning instance.
    pub run_by: Option<String>,
}

impl TaskFilter {
    /// Filter matching one task by id.
    #[must_use]
    pub fn by_id(id: TaskId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Additionally require a status.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Additionally require an owner.
    #[must_use]
    pub fn with_run_by(mut self, run_by: impl Into<String>) -> Self {
        self.run_by = Some(run_by.into());
        self
    }

    /// Whether `task` satisfies every set condition.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.id.is_none_or(|id| id == task.id)
            && self.status.is_none_or(|status| status == task.status)
            && self
                .run_by
                .as_deref()
                .is_none_or(|run_by| task.run_by.as_deref() == Some(run_by))
    }
}

/// Changes to the system-managed fields of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    /// New status.
    pub status: Option<TaskStatus>,
    /// New owner.
    pub run_by: Option<String>,
    /// New claim time.
    pub started_at_ms: Option<u128>,
    /// New finalization time.
    pub ended_at_ms: Option<u128>,
    /// Failure detail.
    pub error: Option<String>,
}

impl TaskUpdate {
    /// `PENDING -> IN_PROGRESS` owned by `instance_id`.
    #[must_use]
    pub fn claim(instance_id: &str, now_ms: u128) -> Self {
        Self {
            status: Some(TaskStatus::InProgress),
            run_by: Some(instance_id.to_string()),
            started_at_ms: Some(now_ms),
            ..Self::default()
        }
    }

    /// Transition to a terminal status.
    #[must_use]
    pub fn finish(status: TaskStatus, now_ms: u128, error: Option<String>) -> Self {
        Self {
            status: Some(status),
            run_by: None,
            started_at_ms: None,
            ended_at_ms: Some(now_ms),
            error,
        }
    }

    /// Apply the update to a task record.
    pub fn apply(&self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(run_by) = &self.run_by {
            task.run_by = Some(run_by.clone());
        }
        if let Some(started) = self.started_at_ms {
            task.started_at_ms = Some(started);
        }
        if let Some(ended) = self.ended_at_ms {
            task.ended_at_ms = Some(ended);
        }
        if let Some(error) = &self.error {
            task.error = Some(error.clone());
        }
    }
}

/// A pending task whose start condition holds, joined with its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTask {
    /// The pending task.
    pub task: Task,
    /// The job it executes.
    pub job: Job,
}

impl CandidateTask {
    /// Slot units this candidate would consume.
    #[must_use]
    pub const fn required_units(&self) -> u32 {
        self.job.required_slots.units()
    }
}
