//! Builder to construct a scheduler instance from configuration.

use std::sync::Arc;

use crate::config::{BucketBackendConfig, SchedulerConfig, StoreBackendConfig, WorkerBackendConfig};
use crate::core::{
    AuditSink, Bucket, Job, JobRegistry, LogShipper, ProcessLauncher, Scheduler, SchedulerError,
    Spawn, TaskStore, ThreadLauncher, WorkerLauncher,
};
use crate::infra::{DirectoryBucket, FileTaskStore, InMemoryBucket, InMemoryTaskStore};

/// Build the task store selected by configuration.
///
/// # Errors
///
/// Returns the store's error when a file store cannot be opened.
pub fn build_store(cfg: &StoreBackendConfig) -> Result<Arc<dyn TaskStore>, SchedulerError> {
    Ok(match cfg {
        StoreBackendConfig::InMemory => Arc::new(InMemoryTaskStore::new()),
        StoreBackendConfig::File { path } => Arc::new(FileTaskStore::open(path)?),
    })
}

/// Build the log bucket selected by configuration.
#[must_use]
pub fn build_bucket(cfg: &BucketBackendConfig) -> Arc<dyn Bucket> {
    match cfg {
        BucketBackendConfig::InMemory => Arc::new(InMemoryBucket::new()),
        BucketBackendConfig::Directory { path } => Arc::new(DirectoryBucket::new(path)),
    }
}

/// Register every configured job that the store does not know yet.
///
/// Jobs are immutable once stored: an existing job with a different
/// definition is kept as-is and reported with a warning. Returns the stored
/// jobs in name order.
///
/// # Errors
///
/// Returns the first store or validation error.
pub async fn register_configured_jobs(
    store: &dyn TaskStore,
    config: &SchedulerConfig,
) -> Result<Vec<Job>, SchedulerError> {
    let mut names: Vec<&String> = config.jobs.keys().collect();
    names.sort();
    let mut jobs = Vec::with_capacity(names.len());
    for name in names {
        let definition = &config.jobs[name];
        if let Some(existing) = store.view_job_by_name(name).await? {
            if existing.script_path != definition.script_path
                || existing.required_slots != definition.required_slots
                || existing.maximum_execution_time != definition.maximum_execution_time
            {
                tracing::warn!(job = %name, "configured job differs from stored job; keeping stored definition");
            }
            jobs.push(existing);
            continue;
        }
        let job = store.create_job(definition.to_new_job(name)).await?;
        tracing::info!(job = %name, job_id = %job.id, slots = job.required_slots.units(), "job registered");
        jobs.push(job);
    }
    Ok(jobs)
}

/// Assembles a [`Scheduler`] from a [`SchedulerConfig`].
///
/// Every component can be overridden; anything not supplied is built from
/// the configuration.
pub struct SchedulerBuilder<S> {
    config: SchedulerConfig,
    spawner: S,
    registry: Option<JobRegistry>,
    store: Option<Arc<dyn TaskStore>>,
    bucket: Option<Arc<dyn Bucket>>,
    launcher: Option<Arc<dyn WorkerLauncher>>,
    audit: Option<Box<dyn AuditSink>>,
}

impl<S> SchedulerBuilder<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a builder for `config`, spawning background work on `spawner`.
    pub fn new(config: SchedulerConfig, spawner: S) -> Self {
        Self {
            config,
            spawner,
            registry: None,
            store: None,
            bucket: None,
            launcher: None,
            audit: None,
        }
    }

    /// Configuration being built.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Job registry for the thread worker backend.
    #[must_use]
    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use `store` instead of the configured backend.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `bucket` instead of the configured backend.
    #[must_use]
    pub fn with_bucket(mut self, bucket: Arc<dyn Bucket>) -> Self {
        self.bucket = Some(bucket);
        self
    }

    /// Use `launcher` instead of the configured worker backend.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the scheduler without touching the store.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Config` when the configuration is invalid or
    /// the thread backend has no registry, and the store's error when the
    /// configured store cannot be opened.
    pub fn build(self) -> Result<Scheduler<S>, SchedulerError> {
        self.config.validate().map_err(SchedulerError::Config)?;

        let store = match self.store {
            Some(store) => store,
            None => build_store(&self.config.store)?,
        };

        let launcher: Arc<dyn WorkerLauncher> = match (self.launcher, self.config.worker) {
            (Some(launcher), _) => launcher,
            (None, WorkerBackendConfig::Thread) => {
                let registry = self.registry.ok_or_else(|| {
                    SchedulerError::Config("thread worker backend requires a job registry".into())
                })?;
                let mut missing: Vec<&String> = self
                    .config
                    .jobs
                    .keys()
                    .filter(|name| !registry.contains(name))
                    .collect();
                missing.sort();
                if !missing.is_empty() {
                    tracing::warn!(jobs = ?missing, "configured jobs have no registered executor");
                }
                Arc::new(ThreadLauncher::new(registry))
            }
            (None, WorkerBackendConfig::Process) => {
                Arc::new(ProcessLauncher::new(self.spawner.clone()))
            }
        };

        let bucket = self
            .bucket
            .or_else(|| self.config.bucket.as_ref().map(build_bucket));
        let mut shipper = LogShipper::new(&self.config.logs_path);
        if let Some(bucket) = bucket {
            shipper = shipper.with_bucket(bucket);
        }

        let mut scheduler =
            Scheduler::new(self.config.settings(), store, launcher, shipper, self.spawner);
        if let Some(audit) = self.audit {
            scheduler = scheduler.with_audit(audit);
        }
        Ok(scheduler)
    }

    /// Build the scheduler and register the configured jobs in its store.
    ///
    /// # Errors
    ///
    /// Returns build errors and the first job registration failure.
    pub async fn build_and_register(self) -> Result<Scheduler<S>, SchedulerError> {
        let config = self.config.clone();
        let scheduler = self.build()?;
        register_configured_jobs(scheduler.store().as_ref(), &config).await?;
        Ok(scheduler)
    }
}
