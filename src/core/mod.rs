//! Core scheduling abstractions: records, the store contract, the scheduler
//! loop and its workers.

pub mod admission;
pub mod audit;
pub mod error;
pub mod executor;
pub mod log_shipper;
pub mod logger;
pub mod model;
pub mod recurrence;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod worker;

pub use admission::{select_candidates, SlotBudget};
pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use error::{AppResult, SchedulerError};
pub use executor::{job_fn, FnExecutor, JobContext, JobExecutor};
pub use log_shipper::{Bucket, LogShipper, LOG_CONTENT_TYPE};
pub use logger::{last_failure, parse_log_line, LogLevel, TaskLogger};
pub use model::{
    CandidateTask, Job, JobId, NewJob, NewTask, SlotSize, Task, TaskFilter, TaskId, TaskStatus,
    TaskUpdate,
};
pub use recurrence::RecurrenceEngine;
pub use registry::{JobRegistry, JobRegistryBuilder};
pub use scheduler::{
    InFlightSnapshot, Scheduler, SchedulerControl, SchedulerSettings, SchedulerSnapshot,
    SchedulerState, Spawn, TickReport, KILL_CONFIRM_TIMEOUT,
};
pub use store::TaskStore;
pub use worker::{
    KillSignal, LaunchSpec, ProcessLauncher, ThreadLauncher, WorkerEvent, WorkerEventKind,
    WorkerHandle, WorkerLauncher,
};
