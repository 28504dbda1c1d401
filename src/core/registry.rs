//! Job registry: the immutable map from job names to executable entry points.
//!
//! The host application builds one registry at startup and hands it to the
//! workers; nothing in the crate keeps a process-wide registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::{JobExecutor, SchedulerError};

/// Immutable job name to executor map. Cheap to clone.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<HashMap<String, Arc<dyn JobExecutor>>>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}

impl JobRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> JobRegistryBuilder {
        JobRegistryBuilder::default()
    }

    /// Executor registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn JobExecutor>> {
        self.jobs.get(name).cloned()
    }

    /// Executor registered under `name`, or `UnknownJob`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::UnknownJob` when no job has that name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn JobExecutor>, SchedulerError> {
        self.get(name)
            .ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))
    }

    /// Whether a job is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// Registered job names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no job is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Collects executors before freezing them into a [`JobRegistry`].
#[derive(Default)]
pub struct JobRegistryBuilder {
    jobs: HashMap<String, Arc<dyn JobExecutor>>,
}

impl JobRegistryBuilder {
    /// Register `executor` under `name`, replacing any earlier registration.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, executor: impl JobExecutor) -> Self {
        let name = name.into();
        if self.jobs.insert(name.clone(), Arc::new(executor)).is_some() {
            tracing::warn!(job = %name, "job registered twice; keeping the last executor");
        }
        self
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> JobRegistry {
        JobRegistry {
            jobs: Arc::new(self.jobs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{job_fn, JobContext};

    #[test]
    fn test_registry_lookup() {
        let registry = JobRegistry::builder()
            .register("report", job_fn(|_ctx: JobContext| async { Ok(()) }))
            .register("cleanup", job_fn(|_ctx: JobContext| async { Ok(()) }))
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("report"));
        assert!(registry.get("missing").is_none());
        assert!(matches!(
            registry.resolve("missing"),
            Err(SchedulerError::UnknownJob(name)) if name == "missing"
        ));
        assert_eq!(registry.names(), vec!["cleanup".to_string(), "report".to_string()]);
    }

    #[test]
    fn test_empty_registry() {
        let registry = JobRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(format!("{registry:?}"), "JobRegistry { jobs: [] }");
    }
}
