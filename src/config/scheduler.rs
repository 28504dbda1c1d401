//! Scheduler instance configuration structures.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{NewJob, SchedulerError, SchedulerSettings, SlotSize};

/// Environment variable naming the JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "SCHEDULER_CONFIG";
/// Environment override for [`SchedulerConfig::instance_id`].
pub const INSTANCE_ID_ENV: &str = "SCHEDULER_INSTANCE_ID";
/// Environment override for [`SchedulerConfig::available_slots`].
pub const AVAILABLE_SLOTS_ENV: &str = "SCHEDULER_AVAILABLE_SLOTS";
/// Environment override for [`SchedulerConfig::logs_path`].
pub const LOGS_PATH_ENV: &str = "SCHEDULER_LOGS_PATH";

/// Worker backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerBackendConfig {
    /// Dedicated OS thread per task, jobs resolved from the in-process registry.
    ///
    /// A timed-out or terminated job is stopped at its next await point. A
    /// job that blocks without awaiting keeps its thread busy after its slots
    /// were freed, so real concurrency can exceed `availableSlots`; use
    /// `Process` for such jobs.
    #[default]
    Thread,
    /// Child process per task, started as `<path> <jobName>`.
    Process,
}

/// Task store backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StoreBackendConfig {
    /// In-memory store for development/testing.
    #[default]
    InMemory,
    /// JSON-lines file store.
    File {
        /// Snapshot file location.
        path: PathBuf,
    },
}

/// Log bucket backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BucketBackendConfig {
    /// In-memory bucket.
    InMemory,
    /// Objects stored as files under a root directory.
    Directory {
        /// Root directory.
        path: PathBuf,
    },
}

/// Job registered in the store at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Entry point locator, `<path> <jobName>`.
    pub script_path: String,
    /// Slot units consumed by one execution.
    pub required_slots: SlotSize,
    /// Execution budget in seconds.
    pub maximum_execution_time: u64,
}

impl JobDefinition {
    /// Registration request for this definition under `name`.
    #[must_use]
    pub fn to_new_job(&self, name: &str) -> NewJob {
        NewJob {
            name: name.to_string(),
            script_path: self.script_path.clone(),
            required_slots: self.required_slots,
            maximum_execution_time: self.maximum_execution_time,
        }
    }
}

const fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_logs_path() -> PathBuf {
    PathBuf::from("logs")
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Identity written to `_runBy`; must be stable across restarts for
    /// crash recovery to find this instance's tasks.
    pub instance_id: String,
    /// Slot units this instance may have in flight.
    pub available_slots: u32,
    /// Directory holding `<taskId>.log` files.
    #[serde(default = "default_logs_path")]
    pub logs_path: PathBuf,
    /// Milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Worker backend selection.
    #[serde(default)]
    pub worker: WorkerBackendConfig,
    /// Task store backend selection.
    #[serde(default)]
    pub store: StoreBackendConfig,
    /// Log bucket; logs stay local when absent.
    #[serde(default)]
    pub bucket: Option<BucketBackendConfig>,
    /// Jobs registered at startup, keyed by name.
    #[serde(default)]
    pub jobs: HashMap<String, JobDefinition>,
}

impl SchedulerConfig {
    /// Minimal configuration with defaults for everything else.
    #[must_use]
    pub fn new(instance_id: impl Into<String>, available_slots: u32) -> Self {
        Self {
            instance_id: instance_id.into(),
            available_slots,
            logs_path: default_logs_path(),
            tick_interval_ms: default_tick_interval_ms(),
            worker: WorkerBackendConfig::default(),
            store: StoreBackendConfig::default(),
            bucket: None,
            jobs: HashMap::new(),
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.instance_id.trim().is_empty() {
            return Err("instance_id must not be empty".into());
        }
        if self.available_slots == 0 {
            return Err("available_slots must be greater than 0".into());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".into());
        }
        for (name, job) in &self.jobs {
            job.to_new_job(name)
                .validate()
                .map_err(|e| format!("job `{name}` invalid: {e}"))?;
            if job.required_slots.units() > self.available_slots {
                return Err(format!(
                    "job `{name}` requires {} slots but only {} are available",
                    job.required_slots.units(),
                    self.available_slots
                ));
            }
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the environment.
    ///
    /// Reads `.env` if present, parses the JSON file named by
    /// `SCHEDULER_CONFIG`, then applies the `SCHEDULER_INSTANCE_ID`,
    /// `SCHEDULER_AVAILABLE_SLOTS` and `SCHEDULER_LOGS_PATH` overrides.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Config` when the file is missing or invalid
    /// or an override cannot be parsed.
    pub fn from_env() -> Result<Self, SchedulerError> {
        // A missing .env file is fine; the process environment still applies.
        let _ = dotenvy::dotenv();

        let path = std::env::var(CONFIG_PATH_ENV)
            .map_err(|e| SchedulerError::Config(format!("{CONFIG_PATH_ENV}: {e}")))?;
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| SchedulerError::Config(format!("{path}: {e}")))?;
        let mut cfg: Self = serde_json::from_str(&raw)
            .map_err(|e| SchedulerError::Config(format!("{path}: parse error: {e}")))?;

        if let Ok(instance_id) = std::env::var(INSTANCE_ID_ENV) {
            cfg.instance_id = instance_id;
        }
        if let Ok(slots) = std::env::var(AVAILABLE_SLOTS_ENV) {
            cfg.available_slots = slots
                .parse()
                .map_err(|e| SchedulerError::Config(format!("{AVAILABLE_SLOTS_ENV}: {e}")))?;
        }
        if let Ok(logs_path) = std::env::var(LOGS_PATH_ENV) {
            cfg.logs_path = PathBuf::from(logs_path);
        }

        cfg.validate().map_err(SchedulerError::Config)?;
        Ok(cfg)
    }

    /// Interval between ticks.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Settings for the scheduler loop.
    #[must_use]
    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            instance_id: self.instance_id.clone(),
            available_slots: self.available_slots,
            tick_interval: self.tick_interval(),
        }
    }
}
