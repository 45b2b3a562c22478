//! # Job configuration.
//!
//! [`JobConfig`] is the validated description a [`Job`](crate::Job) is built
//! from. File parsing lives elsewhere; this module only offers builders,
//! validation, and the chain helpers that wire preStart/preStop/postStop jobs
//! to their parent through events.
//!
//! ## Chain wiring
//! ```text
//! app.preStart ──ExitSuccess{app.preStart}──► app ──Stopping{app}──► app.preStop
//!                                              ▲                         │
//!                                              └──── Stopped{app.preStop}┘ (stopping wait)
//!                                              app ──Stopped{app}──► app.postStop
//! ```
//!
//! ## Defaults
//! - Trigger: `Startup{global}`, once, no startup-wait timeout.
//! - Restarts: `Unlimited` for periodic jobs, `Never` otherwise.
//! - Command timeout: the run-every interval for periodic jobs, none otherwise.
//!
//! ## Example
//! ```rust
//! use jobvisor::{Event, EventCode, JobConfig, RestartPolicy};
//! use std::time::Duration;
//!
//! let mut app = JobConfig::new("app").with_exec("/bin/app --serve");
//! let pre = JobConfig::pre_start(&mut app, "/bin/migrate");
//! assert_eq!(app.when().event, Event::new(EventCode::ExitSuccess, "app.preStart"));
//! assert_eq!(pre.name(), "app.preStart");
//! assert_eq!(app.restarts(), RestartPolicy::Never);
//!
//! let cron = JobConfig::new("cron").with_exec("true").every(Duration::from_secs(60));
//! assert_eq!(cron.restarts(), RestartPolicy::Unlimited);
//! assert!(cron.validate().is_ok());
//! ```

use std::time::Duration;

use crate::commands::parse_args;
use crate::discovery::Advertisement;
use crate::error::ConfigError;
use crate::events::{Event, EventCode, MIN_PERIOD};
use crate::policies::RestartPolicy;

/// How often the start trigger may fire the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Starts {
    /// The first occurrence starts the job; later ones are ignored.
    #[default]
    Once,
    /// Every occurrence starts the job.
    Each,
}

/// The start trigger of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct When {
    /// Event that starts the job.
    pub event: Event,
    /// Whether the event fires the job once or on each occurrence.
    pub starts: Starts,
    /// Give up waiting for `event` after this long.
    pub timeout: Option<Duration>,
}

impl Default for When {
    fn default() -> Self {
        Self {
            event: Event::global_startup(),
            starts: Starts::Once,
            timeout: None,
        }
    }
}

/// Validated description of a job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    name: String,
    exec: Option<String>,
    exec_timeout: Option<Duration>,
    uid: Option<u32>,
    gid: Option<u32>,
    when: When,
    interval: Option<Duration>,
    restarts: Option<RestartPolicy>,
    heartbeat: Option<Duration>,
    service: Option<Advertisement>,
    always_healthy: bool,
    stopping_wait: Option<Event>,
    stopping_timeout: Option<Duration>,
}

impl JobConfig {
    /// A job named `name` with every default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exec: None,
            exec_timeout: None,
            uid: None,
            gid: None,
            when: When::default(),
            interval: None,
            restarts: None,
            heartbeat: None,
            service: None,
            always_healthy: false,
            stopping_wait: None,
            stopping_timeout: None,
        }
    }

    /// Builds the preStart job of `parent` and makes `parent` start on its success.
    pub fn pre_start(parent: &mut JobConfig, exec: impl Into<String>) -> JobConfig {
        let name = format!("{}.preStart", parent.name);
        parent.when.event = Event::new(EventCode::ExitSuccess, name.as_str());
        parent.when.starts = Starts::Once;
        JobConfig::new(name).with_exec(exec)
    }

    /// Builds the preStop job of `parent`: it runs once `parent` starts stopping.
    ///
    /// Run [`link_stop_dependencies`] over the full set so `parent` waits for it.
    pub fn pre_stop(parent: &JobConfig, exec: impl Into<String>) -> JobConfig {
        JobConfig::new(format!("{}.preStop", parent.name))
            .with_exec(exec)
            .when_once(Event::new(EventCode::Stopping, parent.name.as_str()))
    }

    /// Builds the postStop job of `parent`: it runs once `parent` has stopped.
    pub fn post_stop(parent: &JobConfig, exec: impl Into<String>) -> JobConfig {
        JobConfig::new(format!("{}.postStop", parent.name))
            .with_exec(exec)
            .when_once(Event::new(EventCode::Stopped, parent.name.as_str()))
    }

    /// Sets the command line.
    pub fn with_exec(mut self, exec: impl Into<String>) -> Self {
        self.exec = Some(exec.into());
        self
    }

    /// Sets the per-run command timeout.
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = Some(timeout);
        self
    }

    /// Runs the command as this user/group when the supervisor is root.
    pub fn with_user(mut self, uid: Option<u32>, gid: Option<u32>) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Starts on the first occurrence of `event`.
    pub fn when_once(mut self, event: Event) -> Self {
        self.when.event = event;
        self.when.starts = Starts::Once;
        self
    }

    /// Starts on every occurrence of `event`.
    pub fn when_each(mut self, event: Event) -> Self {
        self.when.event = event;
        self.when.starts = Starts::Each;
        self
    }

    /// Stops the job if its trigger has not fired within `timeout`.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.when.timeout = Some(timeout);
        self
    }

    /// Runs at startup and then every `interval`.
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self.when = When::default();
        self
    }

    /// Sets the restart policy.
    pub fn with_restarts(mut self, restarts: RestartPolicy) -> Self {
        self.restarts = Some(restarts);
        self
    }

    /// Heartbeats the advertisement every `interval` while healthy.
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = Some(interval);
        self
    }

    /// Advertises the job to service discovery.
    pub fn advertise(mut self, service: Advertisement) -> Self {
        self.service = Some(service);
        self
    }

    /// Pins the job status to healthy.
    pub fn always_healthy(mut self) -> Self {
        self.always_healthy = true;
        self
    }

    /// Waits for `event` during the stopping sequence.
    pub fn with_stopping_wait(mut self, event: Event) -> Self {
        self.stopping_wait = Some(event);
        self
    }

    /// Stops waiting for the stopping-wait event after `timeout`.
    pub fn with_stopping_timeout(mut self, timeout: Duration) -> Self {
        self.stopping_timeout = Some(timeout);
        self
    }

    /// Job name; also the source of every event the job publishes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command line, if any.
    pub fn exec(&self) -> Option<&str> {
        self.exec.as_deref()
    }

    /// Command timeout, defaulting to the interval for periodic jobs.
    pub fn exec_timeout(&self) -> Option<Duration> {
        self.exec_timeout.or(self.interval)
    }

    pub(crate) fn user(&self) -> (Option<u32>, Option<u32>) {
        (self.uid, self.gid)
    }

    /// Start trigger.
    pub fn when(&self) -> &When {
        &self.when
    }

    /// Run-every interval.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Effective restart policy.
    pub fn restarts(&self) -> RestartPolicy {
        match (self.restarts, self.interval) {
            (Some(policy), _) => policy,
            (None, Some(_)) => RestartPolicy::Unlimited,
            (None, None) => RestartPolicy::Never,
        }
    }

    /// Heartbeat interval.
    pub fn heartbeat(&self) -> Option<Duration> {
        self.heartbeat
    }

    /// Advertisement, if the job is advertised.
    pub fn service(&self) -> Option<&Advertisement> {
        self.service.as_ref()
    }

    /// True if the job status is pinned to healthy.
    pub fn is_always_healthy(&self) -> bool {
        self.always_healthy
    }

    /// Event awaited during the stopping sequence.
    pub fn stopping_wait(&self) -> Option<&Event> {
        self.stopping_wait.as_ref()
    }

    /// Fallback for the stopping wait.
    pub fn stopping_timeout(&self) -> Option<Duration> {
        self.stopping_timeout
    }

    /// Checks the guarantees a running job relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingName { kind: "job" });
        }
        let owner = format!("job[{}]", self.name);
        check_duration(&owner, "when.interval", self.interval)?;
        check_duration(&owner, "when.timeout", self.when.timeout)?;
        check_duration(&owner, "timeout", self.exec_timeout)?;
        check_duration(&owner, "heartbeat", self.heartbeat)?;
        check_duration(&owner, "stopTimeout", self.stopping_timeout)?;

        if self.restarts == Some(RestartPolicy::Unlimited) && self.when.starts == Starts::Each {
            return Err(ConfigError::InvalidRestarts {
                name: self.name.clone(),
                value: RestartPolicy::Unlimited.to_string(),
                reason: "may not be used with 'each' starts because it may result in infinite processes",
            });
        }
        if let Some(exec) = &self.exec {
            parse_args(&self.name, exec)?;
        }
        Ok(())
    }
}

fn check_duration(owner: &str, field: &'static str, value: Option<Duration>) -> Result<(), ConfigError> {
    match value {
        Some(value) if value < MIN_PERIOD => Err(ConfigError::DurationTooShort {
            owner: owner.to_string(),
            field,
            value,
            min: MIN_PERIOD,
        }),
        _ => Ok(()),
    }
}

/// Makes every job that some other job starts from via `Stopping{job}` wait
/// for that dependent's `Stopped` event before it stops itself.
pub fn link_stop_dependencies(jobs: &mut [JobConfig]) {
    let dependents: Vec<(String, String)> = jobs
        .iter()
        .filter(|j| j.when.event.code == EventCode::Stopping)
        .map(|j| (j.when.event.source.to_string(), j.name.clone()))
        .collect();

    for (parent, dependent) in dependents {
        if let Some(job) = jobs.iter_mut().find(|j| j.name == parent) {
            job.stopping_wait = Some(Event::new(EventCode::Stopped, dependent));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = JobConfig::new("app").with_exec("true");
        assert_eq!(cfg.when(), &When::default());
        assert_eq!(cfg.restarts(), RestartPolicy::Never);
        assert_eq!(cfg.exec_timeout(), None);
        assert!(cfg.validate().is_ok());

        let periodic = JobConfig::new("tick").with_exec("true").every(Duration::from_millis(10));
        assert_eq!(periodic.exec_timeout(), Some(Duration::from_millis(10)));
        assert_eq!(periodic.restarts(), RestartPolicy::Unlimited);
    }

    #[test]
    fn test_validate_rejects() {
        assert_eq!(
            JobConfig::new(" ").validate(),
            Err(ConfigError::MissingName { kind: "job" })
        );

        let err = JobConfig::new("app").every(Duration::ZERO).validate().unwrap_err();
        assert_eq!(err.as_label(), "config_duration_too_short");

        let err = JobConfig::new("app")
            .when_each(Event::new(EventCode::StatusChanged, "watch.db"))
            .with_restarts(RestartPolicy::Unlimited)
            .validate()
            .unwrap_err();
        assert_eq!(err.as_label(), "config_invalid_restarts");

        let err = JobConfig::new("app").with_exec("  ").validate().unwrap_err();
        assert_eq!(err, ConfigError::EmptyCommand { name: "app".into() });
    }

    #[test]
    fn test_chain_helpers_and_stop_links() {
        let mut app = JobConfig::new("app").with_exec("/bin/app");
        let pre_start = JobConfig::pre_start(&mut app, "/bin/setup");
        let pre_stop = JobConfig::pre_stop(&app, "/bin/drain");
        let post_stop = JobConfig::post_stop(&app, "/bin/cleanup");

        assert_eq!(pre_start.when(), &When::default());
        assert_eq!(pre_stop.when().event, Event::new(EventCode::Stopping, "app"));
        assert_eq!(post_stop.when().event, Event::new(EventCode::Stopped, "app"));

        let mut all = vec![pre_start, app, pre_stop, post_stop];
        link_stop_dependencies(&mut all);
        assert_eq!(
            all[1].stopping_wait(),
            Some(&Event::new(EventCode::Stopped, "app.preStop"))
        );
        assert!(all[0].stopping_wait().is_none());
        assert!(all[3].stopping_wait().is_none());
    }
}
