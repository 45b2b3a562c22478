use std::time::Duration;

use crate::commands::parse_args;
use crate::error::ConfigError;
use crate::events::MIN_PERIOD;

/// Validated description of a health check for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckConfig {
    service: String,
    exec: String,
    interval: Duration,
    timeout: Option<Duration>,
}

impl HealthCheckConfig {
    /// Checks the job named `service` by running `exec` every `interval`.
    pub fn new(service: impl Into<String>, exec: impl Into<String>, interval: Duration) -> Self {
        Self {
            service: service.into(),
            exec: exec.into(),
            interval,
            timeout: None,
        }
    }

    /// Kills a check run that takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `check.<service>`: the source of the check's own events.
    pub fn name(&self) -> String {
        format!("check.{}", self.service)
    }

    /// Name of the checked job.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Check command line.
    pub fn exec(&self) -> &str {
        &self.exec
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check command timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Checks name, interval and command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.trim().is_empty() {
            return Err(ConfigError::MissingName { kind: "check" });
        }
        for (field, value) in [("interval", Some(self.interval)), ("timeout", self.timeout)] {
            if let Some(value) = value.filter(|v| *v < MIN_PERIOD) {
                return Err(ConfigError::DurationTooShort {
                    owner: self.name(),
                    field,
                    value,
                    min: MIN_PERIOD,
                });
            }
        }
        parse_args(&self.name(), &self.exec)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        let cfg = HealthCheckConfig::new("web", "curl -f localhost", Duration::from_secs(5));
        assert_eq!(cfg.name(), "check.web");
        assert!(cfg.validate().is_ok());
        assert_eq!(
            HealthCheckConfig::new("web", "", Duration::from_secs(5)).validate(),
            Err(ConfigError::EmptyCommand { name: "check.web".into() })
        );
        assert!(HealthCheckConfig::new("web", "true", Duration::from_secs(5))
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
