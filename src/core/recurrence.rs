//! Recurrence engine: schedules the next occurrence of a completed task.

use std::sync::Arc;

use crate::core::model::{NewTask, Task};
use crate::core::{SchedulerError, TaskStatus, TaskStore};
use crate::util::clock::secs_to_ms;

/// Creates follow-up occurrences through the store's task creation path.
#[derive(Clone)]
pub struct RecurrenceEngine {
    store: Arc<dyn TaskStore>,
}

impl RecurrenceEngine {
    /// Engine creating occurrences in `store`.
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Request for the occurrence following `completed`, if it recurs.
    ///
    /// Only `COMPLETED` tasks with a recurrence produce a follow-up. The next
    /// occurrence starts `recurrence` seconds after the completion time and
    /// carries the same job, metadata and recurrence, with `_parent` set to
    /// the completed task.
    #[must_use]
    pub fn next_occurrence(completed: &Task) -> Option<NewTask> {
        if completed.status != TaskStatus::Completed {
            return None;
        }
        let interval = completed.recurrence_secs.filter(|secs| *secs > 0)?;
        let ended_at = completed.ended_at_ms?;
        let mut next = NewTask::at(completed.job, ended_at + secs_to_ms(interval))
            .with_recurrence(interval)
            .with_meta_data(completed.meta_data.clone());
        next.parent = Some(completed.id);
        Some(next)
    }

    /// Create the next occurrence of `completed`.
    ///
    /// Returns `Ok(None)` when the task does not recur.
    ///
    /// # Errors
    ///
    /// Propagates store failures; the caller retries on a later tick.
    pub async fn schedule_next(
        &self,
        completed: &Task,
        now_ms: u128,
    ) -> Result<Option<Task>, SchedulerError> {
        let Some(next) = Self::next_occurrence(completed) else {
            return Ok(None);
        };
        let task = self.store.create_task(next, now_ms).await?;
        tracing::info!(
            task_id = %completed.id,
            next_task_id = %task.id,
            start_at_ms = ?task.start_at_ms,
            "scheduled next occurrence"
        );
        Ok(Some(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{NewJob, TaskUpdate};
    use crate::core::SlotSize;
    use crate::infra::InMemoryTaskStore;

    async fn completed_task(store: &InMemoryTaskStore, name: &str, recurrence: Option<u64>) -> Task {
        let job = store
            .create_job(NewJob {
                name: name.into(),
                script_path: format!("/bin/worker {name}"),
                required_slots: SlotSize::S256,
                maximum_execution_time: 10,
            })
            .await
            .unwrap();
        let mut request = NewTask::at(job.id, 0).with_meta_data(r#"{"k":1}"#);
        if let Some(secs) = recurrence {
            request = request.with_recurrence(secs);
        }
        let mut task = store.create_task(request, 0).await.unwrap();
        TaskUpdate::claim("alpha", 100).apply(&mut task);
        TaskUpdate::finish(TaskStatus::Completed, 1_000, None).apply(&mut task);
        task
    }

    #[tokio::test]
    async fn test_next_occurrence_inherits_fields() {
        let store = Arc::new(InMemoryTaskStore::new());
        let completed = completed_task(&store, "report", Some(60)).await;
        let engine = RecurrenceEngine::new(store.clone());

        let next = engine.schedule_next(&completed, 1_001).await.unwrap().unwrap();
        assert_eq!(next.status, TaskStatus::Pending);
        assert_eq!(next.start_at_ms, Some(61_000));
        assert_eq!(next.recurrence_secs, Some(60));
        assert_eq!(next.meta_data, r#"{"k":1}"#);
        assert_eq!(next.parent, Some(completed.id));
        assert_eq!(next.job, completed.job);
    }

    #[tokio::test]
    async fn test_non_recurring_and_failed_tasks_stop() {
        let store = Arc::new(InMemoryTaskStore::new());
        let once = completed_task(&store, "once", None).await;
        assert!(RecurrenceEngine::next_occurrence(&once).is_none());

        let mut failed = completed_task(&store, "failing", Some(60)).await;
        failed.status = TaskStatus::Failed;
        assert!(RecurrenceEngine::next_occurrence(&failed).is_none());

        let engine = RecurrenceEngine::new(store);
        assert!(engine.schedule_next(&failed, 0).await.unwrap().is_none());
    }
}
