//! Configuration models for the scheduler instance, its backends and jobs.

pub mod scheduler;

pub use scheduler::{
    BucketBackendConfig, JobDefinition, SchedulerConfig, StoreBackendConfig, WorkerBackendConfig,
};
