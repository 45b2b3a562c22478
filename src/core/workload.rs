//! # Workload: everything one supervisor generation runs.
//!
//! A [`Loader`] produces a fresh [`Workload`] at startup and on every reload.
//! Any `Fn() -> Result<Workload, ConfigError>` is a loader, and so is a
//! `Workload` itself (it is cloned on each load).

use std::collections::HashSet;
use std::sync::Arc;

use crate::checks::HealthCheckConfig;
use crate::discovery::Discovery;
use crate::error::ConfigError;
use crate::jobs::JobConfig;
use crate::watches::WatchConfig;

/// Jobs, watches and health checks plus the discovery backend watches query.
#[derive(Clone, Default)]
pub struct Workload {
    /// Job configurations.
    pub jobs: Vec<JobConfig>,
    /// Watch configurations.
    pub watches: Vec<WatchConfig>,
    /// Health check configurations.
    pub checks: Vec<HealthCheckConfig>,
    /// Backend used by watches.
    pub discovery: Option<Arc<dyn Discovery>>,
}

impl Workload {
    /// Empty workload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job.
    pub fn with_job(mut self, job: JobConfig) -> Self {
        self.jobs.push(job);
        self
    }

    /// Adds a watch.
    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.watches.push(watch);
        self
    }

    /// Adds a health check.
    pub fn with_check(mut self, check: HealthCheckConfig) -> Self {
        self.checks.push(check);
        self
    }

    /// Sets the discovery backend.
    pub fn with_discovery(mut self, backend: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(backend);
        self
    }

    /// Validates every entity, then checks names are unique per kind and
    /// that watches have a backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for job in &self.jobs {
            job.validate()?;
        }
        for watch in &self.watches {
            watch.validate()?;
        }
        for check in &self.checks {
            check.validate()?;
        }

        unique("job", self.jobs.iter().map(|j| j.name().to_string()))?;
        unique("watch", self.watches.iter().map(WatchConfig::name))?;
        unique("check", self.checks.iter().map(HealthCheckConfig::name))?;

        match (self.watches.first(), &self.discovery) {
            (Some(watch), None) => Err(ConfigError::MissingDiscovery { watch: watch.name() }),
            _ => Ok(()),
        }
    }
}

fn unique(kind: &'static str, names: impl Iterator<Item = String>) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicateName { kind, name });
        }
    }
    Ok(())
}

/// Source of workloads for [`Supervisor::run`](crate::Supervisor::run).
pub trait Loader: Send + Sync {
    /// Builds the next workload.
    fn load(&self) -> Result<Workload, ConfigError>;
}

impl<F> Loader for F
where
    F: Fn() -> Result<Workload, ConfigError> + Send + Sync,
{
    fn load(&self) -> Result<Workload, ConfigError> {
        self()
    }
}

impl Loader for Workload {
    fn load(&self) -> Result<Workload, ConfigError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_validate_rejects_duplicates() {
        let wl = Workload::new()
            .with_job(JobConfig::new("app").with_exec("true"))
            .with_job(JobConfig::new("app").with_exec("false"));
        assert_eq!(
            wl.validate(),
            Err(ConfigError::DuplicateName { kind: "job", name: "app".into() })
        );
    }

    #[test]
    fn test_validate_requires_discovery_for_watches() {
        let wl = Workload::new().with_watch(WatchConfig::new("db", Duration::from_secs(1)));
        assert_eq!(
            wl.validate(),
            Err(ConfigError::MissingDiscovery { watch: "watch.db".into() })
        );

        let wl = wl.with_discovery(Arc::new(crate::discovery::fake::FakeDiscovery::default()));
        assert!(wl.validate().is_ok());
    }

    #[test]
    fn test_workload_is_its_own_loader() {
        let wl = Workload::new().with_check(HealthCheckConfig::new("web", "true", Duration::from_secs(1)));
        let loaded = wl.load().unwrap();
        assert_eq!(loaded.checks, wl.checks);
    }
}
