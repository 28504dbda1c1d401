//! # Prometheus Job Scheduler
//!
//! A slot-budgeted job scheduler for running background jobs across one or
//! more scheduler instances that share a task store.
//!
//! Each instance periodically claims pending tasks that fit its private slot
//! budget, runs every claimed task in an isolated worker (an OS thread or a
//! child process), enforces each job's maximum execution time, writes the
//! task's output to `<logsPath>/<taskId>.log`, ships that log to a bucket on
//! a best-effort basis, and schedules the next occurrence of recurring tasks.
//!
//! ## Key Features
//!
//! - **Optimistic claiming**: instances coordinate only through the store's
//!   conditional update; a task leaves `PENDING` on at most one instance
//! - **Slot budgets**: jobs consume 256 to 4096 slot units; candidates are
//!   bin-packed greedily into the free budget every tick
//! - **Isolated workers**: thread workers with their own runtime, or process
//!   workers started as `<path> <jobName>`
//! - **Timeouts and crash recovery**: overdue workers are killed; tasks left
//!   running by a crashed instance are failed when it restarts
//! - **Recurrence**: completed recurring tasks spawn their next occurrence
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_job_scheduler::builders::SchedulerBuilder;
//! use prometheus_job_scheduler::config::SchedulerConfig;
//! use prometheus_job_scheduler::core::{job_fn, JobContext, JobRegistry};
//! use prometheus_job_scheduler::runtime::TokioSpawner;
//!
//! let registry = JobRegistry::builder()
//!     .register("nightly-report", job_fn(|ctx: JobContext| async move {
//!         ctx.logger.info("building report");
//!         Ok(())
//!     }))
//!     .build();
//!
//! let scheduler = SchedulerBuilder::new(SchedulerConfig::from_env()?, TokioSpawner::current()?)
//!     .with_registry(registry)
//!     .build_and_register()
//!     .await?;
//! let scheduler = Arc::new(scheduler);
//!
//! let control = scheduler.control();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     control.drain();
//! });
//! scheduler.run().await?;
//! ```
//!
//! For complete scenarios, see `tests/scheduler_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: records, store contract, scheduler loop,
/// workers.
pub mod core;
/// Configuration models for the instance, its backends and jobs.
pub mod config;
/// Builders to construct scheduler instances from configuration.
pub mod builders;
/// Infrastructure adapters for task stores and log buckets.
pub mod infra;
/// Runtime adapters and the host-facing API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
