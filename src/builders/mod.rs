//! Builders that assemble scheduler instances from configuration.

pub mod scheduler_builder;

pub use scheduler_builder::{build_bucket, build_store, register_configured_jobs, SchedulerBuilder};
