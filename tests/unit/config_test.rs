//! Tests for configuration validation

use std::collections::HashMap;
use std::path::PathBuf;

use prometheus_job_scheduler::config::{
    BucketBackendConfig, JobDefinition, SchedulerConfig, StoreBackendConfig, WorkerBackendConfig,
};
use prometheus_job_scheduler::core::SlotSize;

fn job(script_path: &str, required_slots: SlotSize) -> JobDefinition {
    JobDefinition {
        script_path: script_path.to_string(),
        required_slots,
        maximum_execution_time: 60,
    }
}

#[test]
fn test_scheduler_config_validation() {
    let mut config = SchedulerConfig::new("alpha", 1024);
    config
        .jobs
        .insert("report".into(), job("/opt/jobs/worker report", SlotSize::S512));
    assert!(config.validate().is_ok());
}

#[test]
fn test_scheduler_config_invalid_instance_id() {
    let config = SchedulerConfig::new("  ", 1024);
    assert!(config.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_slots() {
    let config = SchedulerConfig::new("alpha", 0);
    assert!(config.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_tick_interval() {
    let mut config = SchedulerConfig::new("alpha", 1024);
    config.tick_interval_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_job_larger_than_budget_is_rejected() {
    let mut config = SchedulerConfig::new("alpha", 512);
    config
        .jobs
        .insert("big".into(), job("/opt/jobs/worker big", SlotSize::S1024));
    let err = config.validate().unwrap_err();
    assert!(err.contains("big"));
}

#[test]
fn test_job_script_path_must_name_the_job() {
    let mut config = SchedulerConfig::new("alpha", 1024);
    config
        .jobs
        .insert("report".into(), job("/opt/jobs/worker other", SlotSize::S256));
    assert!(config.validate().is_err());

    let mut zero = SchedulerConfig::new("alpha", 1024);
    let mut definition = job("/opt/jobs/worker report", SlotSize::S256);
    definition.maximum_execution_time = 0;
    zero.jobs.insert("report".into(), definition);
    assert!(zero.validate().is_err());
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"{
        "instance_id": "alpha",
        "available_slots": 2048,
        "logs_path": "/var/log/jobs",
        "tick_interval_ms": 500,
        "worker": "process",
        "store": { "kind": "file", "path": "/var/lib/jobs/store.jsonl" },
        "bucket": { "kind": "directory", "path": "/var/lib/jobs/bucket" },
        "jobs": {
            "report": {
                "script_path": "/opt/jobs/worker report",
                "required_slots": 1024,
                "maximum_execution_time": 600
            }
        }
    }"#;

    let config = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(config.instance_id, "alpha");
    assert_eq!(config.logs_path, PathBuf::from("/var/log/jobs"));
    assert_eq!(config.worker, WorkerBackendConfig::Process);
    assert_eq!(
        config.store,
        StoreBackendConfig::File {
            path: PathBuf::from("/var/lib/jobs/store.jsonl")
        }
    );
    assert_eq!(
        config.bucket,
        Some(BucketBackendConfig::Directory {
            path: PathBuf::from("/var/lib/jobs/bucket")
        })
    );
    assert_eq!(config.jobs["report"].required_slots, SlotSize::S1024);
    assert_eq!(config.settings().tick_interval.as_millis(), 500);
}

#[test]
fn test_scheduler_config_defaults() {
    let config =
        SchedulerConfig::from_json_str(r#"{ "instance_id": "alpha", "available_slots": 256 }"#)
            .unwrap();
    assert_eq!(config.tick_interval_ms, 1_000);
    assert_eq!(config.worker, WorkerBackendConfig::Thread);
    assert_eq!(config.store, StoreBackendConfig::InMemory);
    assert!(config.bucket.is_none());
    assert_eq!(config.jobs, HashMap::new());
}

#[test]
fn test_scheduler_config_rejects_unknown_slot_size() {
    let json = r#"{
        "instance_id": "alpha",
        "available_slots": 2048,
        "jobs": {
            "report": {
                "script_path": "/opt/jobs/worker report",
                "required_slots": 300,
                "maximum_execution_time": 60
            }
        }
    }"#;
    let err = SchedulerConfig::from_json_str(json).unwrap_err();
    assert!(err.starts_with("parse error"));
}
