//! Scheduler loop: slot-budgeted claiming, worker supervision and
//! finalization for one scheduler instance.
//!
//! Each instance owns a private slot budget tracked with a lock-free
//! `AtomicU32` (see [`SlotBudget`]), an in-flight table guarded by a
//! `parking_lot::Mutex`, and a crossbeam channel on which workers report
//! their [`WorkerEvent`]s. Ticks never overlap: [`Scheduler::tick`] holds an
//! async mutex for its whole duration.
//!
//! The task store is the only state shared with other instances, and every
//! transition goes through its conditional update.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::core::admission::{select_candidates, SlotBudget};
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::model::{Job, Task, TaskFilter, TaskId, TaskUpdate};
use crate::core::worker::{LaunchSpec, WorkerEvent, WorkerEventKind, WorkerHandle, WorkerLauncher};
use crate::core::{LogShipper, RecurrenceEngine, SchedulerError, TaskStatus, TaskStore};
use crate::util::clock::now_ms;

/// How long a terminated worker's log upload waits for the worker to confirm
/// it has stopped.
pub const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Abstraction for spawning background work on a runtime.
pub trait Spawn {
    /// Spawn a future that runs to completion in the background.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Lifecycle of a scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerState {
    /// Recovering tasks orphaned by a previous run of this instance.
    Initializing,
    /// Claiming and supervising tasks.
    Running,
    /// Supervising in-flight tasks without claiming new ones.
    Draining,
    /// Nothing left to supervise.
    Stopped,
}

/// Per-instance settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Identity written to `_runBy` on claimed tasks.
    pub instance_id: String,
    /// Slot units this instance may have in flight.
    pub available_slots: u32,
    /// Interval between ticks in [`Scheduler::run`].
    pub tick_interval: Duration,
}

/// Shutdown requests shared between the loop and the host.
#[derive(Debug, Default)]
pub struct SchedulerControl {
    drain: AtomicBool,
    terminate: AtomicBool,
    notify: Notify,
}

impl SchedulerControl {
    /// Stop claiming and finish once in-flight tasks are done.
    pub fn drain(&self) {
        self.drain.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Stop claiming, kill every in-flight worker and fail its task.
    pub fn terminate(&self) {
        self.terminate.store(true, Ordering::Release);
        self.drain();
    }

    /// Run the next tick without waiting for the interval.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Whether a drain was requested.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.drain.load(Ordering::Acquire)
    }

    /// Whether a forced shutdown was requested.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Tasks claimed from the store.
    pub claimed: usize,
    /// Claims lost to another instance.
    pub claims_lost: usize,
    /// Workers started.
    pub launched: usize,
    /// Workers that exited successfully.
    pub completed: usize,
    /// Workers that failed, errored or could not be launched.
    pub failed: usize,
    /// Workers killed for exceeding their execution budget.
    pub timed_out: usize,
    /// Workers killed by a forced shutdown.
    pub terminated: usize,
    /// Terminal statuses written to the store.
    pub finalized: usize,
    /// Recurrence occurrences created.
    pub recurred: usize,
    /// Store calls that failed and will be retried.
    pub store_errors: usize,
}

impl TickReport {
    /// Whether the tick changed nothing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// One in-flight execution as seen by [`Scheduler::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlightSnapshot {
    /// Task being executed.
    pub task_id: TaskId,
    /// Job name.
    pub job_name: String,
    /// Slot units held.
    pub units: u32,
    /// Claim time.
    pub started_at_ms: u128,
    /// Forced termination time.
    pub deadline_ms: u128,
    /// Whether the worker reported `Online`.
    pub online: bool,
}

/// Point-in-time view of a scheduler instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    /// Instance identity.
    pub instance_id: String,
    /// Lifecycle state.
    pub state: SchedulerState,
    /// Configured slot budget.
    pub available_slots: u32,
    /// Slot units held by in-flight tasks.
    pub used_slots: u32,
    /// In-flight executions ordered by claim time.
    pub in_flight: Vec<InFlightSnapshot>,
    /// Terminal statuses not yet written to the store.
    pub pending_finalizations: usize,
    /// Completed recurring tasks whose next occurrence is not yet created.
    pub pending_recurrences: usize,
}

struct InFlight {
    task: Task,
    job_name: String,
    units: u32,
    deadline_ms: u128,
    max_execution_secs: u64,
    online: bool,
    handle: WorkerHandle,
}

struct Finalization {
    task: Task,
    status: TaskStatus,
    ended_at_ms: u128,
    error: Option<String>,
    action: AuditAction,
}

/// One scheduler instance.
pub struct Scheduler<S> {
    settings: SchedulerSettings,
    store: Arc<dyn TaskStore>,
    launcher: Arc<dyn WorkerLauncher>,
    shipper: LogShipper,
    recurrence: RecurrenceEngine,
    budget: SlotBudget,
    in_flight: Mutex<HashMap<TaskId, InFlight>>,
    finalizations: Mutex<Vec<Finalization>>,
    recurrences: Mutex<Vec<Task>>,
    events_tx: Sender<WorkerEvent>,
    events_rx: Receiver<WorkerEvent>,
    state: Mutex<SchedulerState>,
    control: Arc<SchedulerControl>,
    audit: Option<Arc<Mutex<Box<dyn AuditSink>>>>,
    tick_lock: tokio::sync::Mutex<()>,
    spawner: S,
}

impl<S> Scheduler<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create an instance in the `INITIALIZING` state.
    pub fn new(
        settings: SchedulerSettings,
        store: Arc<dyn TaskStore>,
        launcher: Arc<dyn WorkerLauncher>,
        shipper: LogShipper,
        spawner: S,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            budget: SlotBudget::new(settings.available_slots),
            recurrence: RecurrenceEngine::new(Arc::clone(&store)),
            settings,
            store,
            launcher,
            shipper,
            in_flight: Mutex::new(HashMap::new()),
            finalizations: Mutex::new(Vec::new()),
            recurrences: Mutex::new(Vec::new()),
            events_tx,
            events_rx,
            state: Mutex::new(SchedulerState::Initializing),
            control: Arc::new(SchedulerControl::default()),
            audit: None,
            tick_lock: tokio::sync::Mutex::new(()),
            spawner,
        }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(Arc::new(Mutex::new(audit)));
        self
    }

    /// Instance identity.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.settings.instance_id
    }

    /// Instance settings.
    #[must_use]
    pub const fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Shared store handle.
    #[must_use]
    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    /// Shutdown controls for this instance.
    #[must_use]
    pub fn control(&self) -> Arc<SchedulerControl> {
        Arc::clone(&self.control)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Slot units currently free.
    #[must_use]
    pub fn free_slots(&self) -> u32 {
        self.budget.free()
    }

    /// Number of in-flight executions.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Point-in-time view of the instance.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let mut in_flight: Vec<InFlightSnapshot> = self
            .in_flight
            .lock()
            .values()
            .map(|entry| InFlightSnapshot {
                task_id: entry.task.id,
                job_name: entry.job_name.clone(),
                units: entry.units,
                started_at_ms: entry.task.started_at_ms.unwrap_or_default(),
                deadline_ms: entry.deadline_ms,
                online: entry.online,
            })
            .collect();
        in_flight.sort_by_key(|entry| (entry.started_at_ms, entry.task_id));
        SchedulerSnapshot {
            instance_id: self.settings.instance_id.clone(),
            state: self.state(),
            available_slots: self.budget.available(),
            used_slots: self.budget.used(),
            in_flight,
            pending_finalizations: self.finalizations.lock().len(),
            pending_recurrences: self.recurrences.lock().len(),
        }
    }

    /// Fail tasks this instance left `IN_PROGRESS` before a crash, then move
    /// to `RUNNING`. Returns how many tasks were recovered.
    ///
    /// # Errors
    ///
    /// Store failures are returned to the caller; an instance that cannot
    /// reach its store at startup should not start.
    pub async fn initialize(&self, now_ms: u128) -> Result<usize, SchedulerError> {
        let instance = self.settings.instance_id.as_str();
        let orphans: Vec<Task> = self
            .store
            .get_running_tasks()
            .await?
            .into_iter()
            .filter(|task| task.run_by.as_deref() == Some(instance))
            .collect();

        let detail = format!(
            "execution lost: scheduler instance `{instance}` restarted while the task was running"
        );
        let mut recovered = 0;
        for task in orphans {
            if self.in_flight.lock().contains_key(&task.id) {
                continue;
            }
            let filter = TaskFilter::by_id(task.id)
                .with_status(TaskStatus::InProgress)
                .with_run_by(instance);
            let update = TaskUpdate::finish(TaskStatus::Failed, now_ms, Some(detail.clone()));
            if self.store.update_matching_task(&filter, &update).await? {
                recovered += 1;
                tracing::warn!(task_id = %task.id, instance = %instance, "failed task orphaned by previous run");
                self.record_audit(task.id, AuditAction::Recover, Some(detail.clone()));
            }
        }

        let mut state = self.state.lock();
        if *state == SchedulerState::Initializing {
            *state = SchedulerState::Running;
        }
        drop(state);
        tracing::info!(
            instance = %instance,
            recovered,
            slots = self.settings.available_slots,
            backend = self.launcher.backend(),
            "scheduler running"
        );
        Ok(recovered)
    }

    /// Run one reconciliation pass at `now_ms`.
    ///
    /// Order: collect worker events, enforce deadlines, honor shutdown
    /// requests, claim and launch while `RUNNING`, then write terminal
    /// statuses and recurrences. Store failures are logged and retried on the
    /// next tick; nothing escapes.
    pub async fn tick(&self, now_ms: u128) -> TickReport {
        let _tick = self.tick_lock.lock().await;
        let mut report = TickReport::default();

        self.collect_worker_events(now_ms, &mut report);
        self.enforce_deadlines(now_ms, &mut report);

        if self.control.is_terminating() {
            self.terminate_all(now_ms, &mut report);
        }
        if self.control.is_draining() {
            let mut state = self.state.lock();
            if *state == SchedulerState::Running {
                *state = SchedulerState::Draining;
                tracing::info!(instance = %self.settings.instance_id, "scheduler draining");
            }
        }

        if self.state() == SchedulerState::Running {
            self.claim_and_launch(now_ms, &mut report).await;
        }

        self.flush_finalizations(&mut report).await;
        self.flush_recurrences(now_ms, &mut report).await;
        self.maybe_stop();

        report
    }

    /// Initialize, then tick on the configured interval until `STOPPED`.
    ///
    /// # Errors
    ///
    /// Returns the store error when startup recovery fails.
    pub async fn run(&self) -> Result<(), SchedulerError> {
        self.initialize(now_ms()).await?;
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                () = self.control.notified() => {}
            }
            let report = self.tick(now_ms()).await;
            if !report.is_idle() {
                tracing::debug!(instance = %self.settings.instance_id, ?report, "tick");
            }
            if self.state() == SchedulerState::Stopped {
                tracing::info!(instance = %self.settings.instance_id, "scheduler stopped");
                return Ok(());
            }
        }
    }

    fn collect_worker_events(&self, now_ms: u128, report: &mut TickReport) {
        while let Ok(event) = self.events_rx.try_recv() {
            let task_id = event.task_id;
            match event.kind {
                WorkerEventKind::Online => {
                    let marked = self
                        .in_flight
                        .lock()
                        .get_mut(&task_id)
                        .map(|entry| entry.online = true)
                        .is_some();
                    if marked {
                        tracing::debug!(task_id = %task_id, "worker online");
                        self.record_audit(task_id, AuditAction::Online, None);
                    }
                }
                WorkerEventKind::Error(detail) => {
                    tracing::warn!(task_id = %task_id, error = %detail, "worker error");
                    if self.retire(task_id, TaskStatus::Failed, Some(format!("worker error: {detail}")), AuditAction::Fail, true, now_ms) {
                        report.failed += 1;
                    }
                }
                WorkerEventKind::Exit { code: 0, .. } => {
                    if self.retire(task_id, TaskStatus::Completed, None, AuditAction::Complete, false, now_ms) {
                        tracing::info!(task_id = %task_id, "task completed");
                        report.completed += 1;
                    }
                }
                WorkerEventKind::Exit { code, detail } => {
                    let detail = detail.unwrap_or_else(|| format!("worker exited with code {code}"));
                    tracing::warn!(task_id = %task_id, code, error = %detail, "task failed");
                    if self.retire(task_id, TaskStatus::Failed, Some(detail), AuditAction::Fail, false, now_ms) {
                        report.failed += 1;
                    }
                }
            }
        }
    }

    fn enforce_deadlines(&self, now_ms: u128, report: &mut TickReport) {
        let expired: Vec<(TaskId, u64)> = self
            .in_flight
            .lock()
            .values()
            .filter(|entry| now_ms > entry.deadline_ms)
            .map(|entry| (entry.task.id, entry.max_execution_secs))
            .collect();
        for (task_id, max_execution_secs) in expired {
            let detail = format!("timed out: exceeded maximum execution time of {max_execution_secs}s");
            tracing::warn!(task_id = %task_id, max_execution_secs, "task timed out; terminating worker");
            if self.retire(task_id, TaskStatus::Failed, Some(detail), AuditAction::Timeout, true, now_ms) {
                report.timed_out += 1;
            }
        }
    }

    fn terminate_all(&self, now_ms: u128, report: &mut TickReport) {
        let ids: Vec<TaskId> = self.in_flight.lock().keys().copied().collect();
        for task_id in ids {
            tracing::warn!(task_id = %task_id, "terminating worker for shutdown");
            if self.retire(
                task_id,
                TaskStatus::Failed,
                Some("terminated: scheduler shut down while the task was running".into()),
                AuditAction::Terminate,
                true,
                now_ms,
            ) {
                report.terminated += 1;
            }
        }
    }

    /// Remove a task from the in-flight table, free its slots, ship its log
    /// and queue its terminal status. Returns `false` if it was not tracked.
    ///
    /// When `kill` is set the log is shipped only after the worker confirms
    /// it stopped, or after [`KILL_CONFIRM_TIMEOUT`].
    fn retire(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        error: Option<String>,
        action: AuditAction,
        kill: bool,
        now_ms: u128,
    ) -> bool {
        let removed = self.in_flight.lock().remove(&task_id);
        let Some(mut entry) = removed else {
            tracing::debug!(task_id = %task_id, "ignoring event for untracked task");
            return false;
        };
        let stopped = if kill { entry.handle.stop() } else { None };
        self.budget.release(entry.units);

        let shipper = self.shipper.clone();
        self.spawner.spawn(async move {
            // A killed worker may still be writing; ship what it left behind.
            if let Some(stopped) = stopped {
                if tokio::time::timeout(KILL_CONFIRM_TIMEOUT, stopped).await.is_err() {
                    tracing::warn!(task_id = %task_id, "worker did not confirm termination; shipping log anyway");
                }
            }
            shipper.ship(task_id).await;
        });

        self.finalizations.lock().push(Finalization {
            task: entry.task,
            status,
            ended_at_ms: now_ms,
            error,
            action,
        });
        true
    }

    async fn claim_and_launch(&self, now_ms: u128, report: &mut TickReport) {
        let free = self.budget.free();
        if free == 0 {
            return;
        }
        let candidates = match self.store.get_candidate_pending_tasks(now_ms).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(instance = %self.settings.instance_id, error = %e, "failed to fetch candidate tasks");
                report.store_errors += 1;
                return;
            }
        };

        let update = TaskUpdate::claim(&self.settings.instance_id, now_ms);
        for candidate in select_candidates(&candidates, free) {
            let units = candidate.required_units();
            if !self.budget.try_reserve(units) {
                continue;
            }
            let filter = TaskFilter::by_id(candidate.task.id).with_status(TaskStatus::Pending);
            match self.store.update_matching_task(&filter, &update).await {
                Ok(true) => {}
                Ok(false) => {
                    self.budget.release(units);
                    report.claims_lost += 1;
                    tracing::debug!(task_id = %candidate.task.id, "task claimed by another instance");
                    continue;
                }
                Err(e) => {
                    self.budget.release(units);
                    report.store_errors += 1;
                    tracing::warn!(task_id = %candidate.task.id, error = %e, "claim failed; retrying next tick");
                    break;
                }
            }

            let mut task = candidate.task.clone();
            update.apply(&mut task);
            report.claimed += 1;
            self.record_audit(task.id, AuditAction::Claim, None);
            if self.launch(task, &candidate.job, units, now_ms) {
                report.launched += 1;
            } else {
                report.failed += 1;
            }
        }
    }

    fn launch(&self, task: Task, job: &Job, units: u32, now_ms: u128) -> bool {
        let task_id = task.id;
        let launched = self.shipper.open(task_id).and_then(|log_file| {
            self.launcher.launch(
                LaunchSpec {
                    task_id,
                    job_name: job.job_name().to_string(),
                    program: job.program().to_string(),
                    meta_data: task.meta_data.clone(),
                    log_file,
                    log_path: self.shipper.log_file_path(task_id),
                },
                self.events_tx.clone(),
            )
        });

        match launched {
            Ok(handle) => {
                let deadline_ms = task.started_at_ms.unwrap_or(now_ms) + job.maximum_execution_ms();
                tracing::info!(
                    task_id = %task_id,
                    job = %job.name,
                    slots = units,
                    deadline_ms,
                    "task started"
                );
                self.in_flight.lock().insert(
                    task_id,
                    InFlight {
                        task,
                        job_name: job.name.clone(),
                        units,
                        deadline_ms,
                        max_execution_secs: job.maximum_execution_time,
                        online: false,
                        handle,
                    },
                );
                true
            }
            Err(e) => {
                self.budget.release(units);
                tracing::warn!(task_id = %task_id, job = %job.name, error = %e, "worker launch failed");
                self.finalizations.lock().push(Finalization {
                    task,
                    status: TaskStatus::Failed,
                    ended_at_ms: now_ms,
                    error: Some(format!("launch failed: {e}")),
                    action: AuditAction::Fail,
                });
                false
            }
        }
    }

    async fn flush_finalizations(&self, report: &mut TickReport) {
        let pending = std::mem::take(&mut *self.finalizations.lock());
        let mut retry = Vec::new();
        let mut pending = pending.into_iter();
        while let Some(mut fin) = pending.next() {
            let filter = TaskFilter::by_id(fin.task.id)
                .with_status(TaskStatus::InProgress)
                .with_run_by(self.settings.instance_id.as_str());
            let update = TaskUpdate::finish(fin.status, fin.ended_at_ms, fin.error.clone());
            match self.store.update_matching_task(&filter, &update).await {
                Ok(true) => {
                    report.finalized += 1;
                    self.record_audit(fin.task.id, fin.action, fin.error.clone());
                    update.apply(&mut fin.task);
                    if fin.status == TaskStatus::Completed && fin.task.recurrence_secs.is_some() {
                        self.recurrences.lock().push(fin.task);
                    }
                }
                Ok(false) => {
                    tracing::debug!(task_id = %fin.task.id, "task already finalized; skipping");
                }
                Err(e) => {
                    tracing::warn!(task_id = %fin.task.id, error = %e, "failed to finalize task; retrying next tick");
                    report.store_errors += 1;
                    retry.push(fin);
                    retry.extend(pending.by_ref());
                }
            }
        }
        if !retry.is_empty() {
            let mut finalizations = self.finalizations.lock();
            retry.append(&mut finalizations);
            *finalizations = retry;
        }
    }

    async fn flush_recurrences(&self, now_ms: u128, report: &mut TickReport) {
        let pending = std::mem::take(&mut *self.recurrences.lock());
        let mut retry = Vec::new();
        for completed in pending {
            match self.recurrence.schedule_next(&completed, now_ms).await {
                Ok(Some(next)) => {
                    report.recurred += 1;
                    self.record_audit(completed.id, AuditAction::Recur, Some(next.id.to_string()));
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    tracing::warn!(task_id = %completed.id, error = %e, "failed to schedule next occurrence; retrying next tick");
                    report.store_errors += 1;
                    retry.push(completed);
                }
                Err(e) => {
                    tracing::error!(task_id = %completed.id, error = %e, "next occurrence rejected");
                }
            }
        }
        if !retry.is_empty() {
            self.recurrences.lock().extend(retry);
        }
    }

    fn maybe_stop(&self) {
        let mut state = self.state.lock();
        if *state != SchedulerState::Draining || !self.in_flight.lock().is_empty() {
            return;
        }
        let unflushed = self.finalizations.lock().len() + self.recurrences.lock().len();
        if unflushed > 0 && !self.control.is_terminating() {
            return;
        }
        if unflushed > 0 {
            tracing::warn!(
                instance = %self.settings.instance_id,
                unflushed,
                "stopping with unwritten task updates; they are recovered on restart"
            );
        }
        *state = SchedulerState::Stopped;
    }

    fn record_audit(&self, task_id: TaskId, action: AuditAction, detail: Option<String>) {
        if let Some(audit_sink) = &self.audit {
            let mut sink = audit_sink.lock();
            sink.record(build_audit_event(
                task_id,
                self.settings.instance_id.as_str(),
                action,
                detail,
            ));
        }
    }
}
