//! Runtime adapters and the host-facing API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{
    cancel_task, health, register_job, snapshot, submit_task, view_task, Health,
    TaskStatusResponse, TaskSubmission,
};
pub use tokio_spawner::TokioSpawner;
