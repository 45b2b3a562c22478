//! Error types used by the jobvisor runtime, its commands and its configuration.
//!
//! This module defines four enums:
//!
//! - [`RuntimeError`]: errors raised by the supervisor itself.
//! - [`ConfigError`]: a job, watch, check or logging config failed validation.
//! - [`CommandError`]: a single command run could not complete normally.
//! - [`DiscoveryError`]: a discovery backend call failed.
//!
//! Running entities never return errors: once a Job, Watch or HealthCheck
//! is started every outcome becomes an event on the bus. These types only
//! surface from construction, validation and the top-level driver.
//! Each type provides `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the supervisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Stop timeout was exceeded; the listed jobs still had running commands and were killed.
    #[error("stop timeout {grace:?} exceeded; killed: {stuck:?}")]
    GraceExceeded {
        /// The configured stop timeout.
        grace: Duration,
        /// Names of jobs whose commands had to be killed.
        stuck: Vec<String>,
    },

    /// The workload could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use jobvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Config(_) => "runtime_config",
        }
    }
}

/// # Errors produced while validating configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A command line was empty.
    #[error("received zero-length argument for {name}")]
    EmptyCommand {
        /// Name of the command owner.
        name: String,
    },

    /// An event code name is not one of the known codes.
    #[error("{0} is not a valid event code")]
    InvalidEventCode(String),

    /// The restart policy could not be parsed or is not allowed here.
    #[error("job[{name}].restarts field '{value}' invalid: {reason}")]
    InvalidRestarts {
        /// Job name.
        name: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A duration is below the minimum resolution.
    #[error("{owner}.{field} '{value:?}' cannot be less than {min:?}")]
    DurationTooShort {
        /// Entity name.
        owner: String,
        /// Field name.
        field: &'static str,
        /// Configured value.
        value: Duration,
        /// Minimum accepted value.
        min: Duration,
    },

    /// A job, watch or check has no name.
    #[error("{kind} name must not be empty")]
    MissingName {
        /// Entity kind ("job", "watch", "check").
        kind: &'static str,
    },

    /// Two entities of the same kind share a name.
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName {
        /// Entity kind.
        kind: &'static str,
        /// The repeated name.
        name: String,
    },

    /// Watches are configured but the workload has no discovery backend.
    #[error("{watch} requires a discovery backend")]
    MissingDiscovery {
        /// Name of the first watch found.
        watch: String,
    },

    /// The logging configuration is invalid or a global subscriber is already set.
    #[error("logging: {0}")]
    Logging(String),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::EmptyCommand { .. } => "config_empty_command",
            ConfigError::InvalidEventCode(_) => "config_invalid_event_code",
            ConfigError::InvalidRestarts { .. } => "config_invalid_restarts",
            ConfigError::DurationTooShort { .. } => "config_duration_too_short",
            ConfigError::MissingName { .. } => "config_missing_name",
            ConfigError::DuplicateName { .. } => "config_duplicate_name",
            ConfigError::MissingDiscovery { .. } => "config_missing_discovery",
            ConfigError::Logging(_) => "config_logging",
        }
    }
}

/// # Errors produced by a single command run.
///
/// A non-zero exit is **not** an error here: it is reported as an exit code
/// and as an `ExitFailed` event. These variants cover runs that never
/// produced a normal exit status.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CommandError {
    /// The process could not be started.
    #[error("unable to start {name}: {source}")]
    Spawn {
        /// Command name.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the process failed.
    #[error("{name} wait failed: {source}")]
    Wait {
        /// Command name.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The process exceeded its timeout and its process group was killed.
    #[error("{name} timeout after {timeout:?}")]
    Timeout {
        /// Command name.
        name: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The run was still queued behind another when its token was cancelled.
    #[error("{name} cancelled before start")]
    Cancelled {
        /// Command name.
        name: String,
    },
}

impl CommandError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use jobvisor::CommandError;
    /// use std::time::Duration;
    ///
    /// let err = CommandError::Timeout { name: "app".into(), timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "command_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CommandError::Spawn { .. } => "command_spawn",
            CommandError::Wait { .. } => "command_wait",
            CommandError::Timeout { .. } => "command_timeout",
            CommandError::Cancelled { .. } => "command_cancelled",
        }
    }
}

/// # Errors produced by a discovery backend.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// The backend rejected or failed the request.
    #[error("discovery backend error for {service}: {message}")]
    Backend {
        /// Service the call was made for.
        service: String,
        /// Backend-provided message.
        message: String,
    },

    /// The backend could not be reached.
    #[error("discovery backend unavailable: {0}")]
    Unavailable(String),
}

impl DiscoveryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DiscoveryError::Backend { .. } => "discovery_backend",
            DiscoveryError::Unavailable(_) => "discovery_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let err = ConfigError::InvalidEventCode("bogus".into());
        assert_eq!(err.as_label(), "config_invalid_event_code");
        assert_eq!(err.to_string(), "bogus is not a valid event code");

        let err = RuntimeError::from(ConfigError::MissingName { kind: "job" });
        assert_eq!(err.as_label(), "runtime_config");
        assert_eq!(err.to_string(), "configuration error: job name must not be empty");

        let err = DiscoveryError::Unavailable("refused".into());
        assert_eq!(err.as_label(), "discovery_unavailable");
    }

    #[test]
    fn test_duration_message() {
        let err = ConfigError::DurationTooShort {
            owner: "job[app]".into(),
            field: "interval",
            value: Duration::ZERO,
            min: Duration::from_millis(1),
        };
        assert_eq!(err.to_string(), "job[app].interval '0ns' cannot be less than 1ms");
    }
}
