use std::time::Duration;

use crate::commands::parse_args;
use crate::error::ConfigError;
use crate::events::MIN_PERIOD;

/// Validated description of a watch on an upstream service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    service: String,
    tag: Option<String>,
    interval: Duration,
    on_change: Option<String>,
    timeout: Option<Duration>,
}

impl WatchConfig {
    /// Watches `service`, polling every `interval`.
    pub fn new(service: impl Into<String>, interval: Duration) -> Self {
        Self {
            service: service.into(),
            tag: None,
            interval,
            on_change: None,
            timeout: None,
        }
    }

    /// Only instances carrying `tag` count.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Runs this command line whenever a change is seen.
    pub fn with_on_change(mut self, exec: impl Into<String>) -> Self {
        self.on_change = Some(exec.into());
        self
    }

    /// Timeout for each on-change run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `watch.<service>`: the source of every event this watch publishes.
    pub fn name(&self) -> String {
        format!("watch.{}", self.service)
    }

    /// Upstream service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Tag filter.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// On-change command line.
    pub fn on_change(&self) -> Option<&str> {
        self.on_change.as_deref()
    }

    /// On-change command timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Checks name, interval and command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.trim().is_empty() {
            return Err(ConfigError::MissingName { kind: "watch" });
        }
        if self.interval < MIN_PERIOD {
            return Err(ConfigError::DurationTooShort {
                owner: self.name(),
                field: "interval",
                value: self.interval,
                min: MIN_PERIOD,
            });
        }
        if let Some(exec) = &self.on_change {
            parse_args(&self.name(), exec)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_validation() {
        let cfg = WatchConfig::new("db", Duration::from_secs(1)).with_tag("primary");
        assert_eq!(cfg.name(), "watch.db");
        assert_eq!(cfg.tag(), Some("primary"));
        assert!(cfg.validate().is_ok());

        assert!(WatchConfig::new("", Duration::from_secs(1)).validate().is_err());
        assert!(WatchConfig::new("db", Duration::ZERO).validate().is_err());
        assert!(WatchConfig::new("db", Duration::from_secs(1))
            .with_on_change(" ")
            .validate()
            .is_err());
    }
}
