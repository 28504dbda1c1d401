//! Tests for builder modules

use std::sync::Arc;

use prometheus_job_scheduler::builders::{build_store, register_configured_jobs, SchedulerBuilder};
use prometheus_job_scheduler::config::{
    JobDefinition, SchedulerConfig, StoreBackendConfig, WorkerBackendConfig,
};
use prometheus_job_scheduler::core::{
    job_fn, JobContext, JobRegistry, SchedulerError, SchedulerState, SlotSize, TaskStore,
};
use prometheus_job_scheduler::infra::InMemoryTaskStore;
use prometheus_job_scheduler::runtime::TokioSpawner;

fn config() -> SchedulerConfig {
    let mut config = SchedulerConfig::new("alpha", 1024);
    config.logs_path = std::env::temp_dir().join(format!("pjs-builder-{}", uuid::Uuid::new_v4()));
    config.jobs.insert(
        "report".into(),
        JobDefinition {
            script_path: "/opt/jobs/worker report".into(),
            required_slots: SlotSize::S512,
            maximum_execution_time: 60,
        },
    );
    config
}

fn registry() -> JobRegistry {
    JobRegistry::builder()
        .register("report", job_fn(|_ctx: JobContext| async { Ok(()) }))
        .build()
}

#[tokio::test]
async fn test_builder_defaults() {
    let builder = SchedulerBuilder::new(config(), TokioSpawner::current().unwrap());
    assert_eq!(builder.config().instance_id, "alpha");

    let scheduler = builder.with_registry(registry()).build().unwrap();
    assert_eq!(scheduler.instance_id(), "alpha");
    assert_eq!(scheduler.state(), SchedulerState::Initializing);
    assert_eq!(scheduler.free_slots(), 1024);
}

#[tokio::test]
async fn test_thread_backend_requires_registry() {
    let result = SchedulerBuilder::new(config(), TokioSpawner::current().unwrap()).build();
    assert!(matches!(result, Err(SchedulerError::Config(_))));

    let mut process = config();
    process.worker = WorkerBackendConfig::Process;
    assert!(SchedulerBuilder::new(process, TokioSpawner::current().unwrap())
        .build()
        .is_ok());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut invalid = config();
    invalid.available_slots = 0;
    let result = SchedulerBuilder::new(invalid, TokioSpawner::current().unwrap())
        .with_registry(registry())
        .build();
    assert!(matches!(result, Err(SchedulerError::Config(_))));
}

#[tokio::test]
async fn test_build_and_register_creates_jobs_once() {
    let store = Arc::new(InMemoryTaskStore::new());
    let scheduler = SchedulerBuilder::new(config(), TokioSpawner::current().unwrap())
        .with_registry(registry())
        .with_store(store.clone())
        .build_and_register()
        .await
        .unwrap();
    let job = store.view_job_by_name("report").await.unwrap().unwrap();
    assert_eq!(job.required_slots, SlotSize::S512);

    let again = register_configured_jobs(scheduler.store().as_ref(), &config())
        .await
        .unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].id, job.id);
}

#[tokio::test]
async fn test_build_file_store() {
    let path = std::env::temp_dir()
        .join(format!("pjs-builder-store-{}", uuid::Uuid::new_v4()))
        .join("store.jsonl");
    let store = build_store(&StoreBackendConfig::File { path }).unwrap();
    assert!(store.get_running_tasks().await.unwrap().is_empty());
}
