//! # Log output setup.
//!
//! Every module logs through `tracing`. [`LogConfig::init`] installs the global
//! subscriber: an `EnvFilter` (the `RUST_LOG` environment variable wins over the
//! configured level) plus a `fmt` layer in text or JSON format.
//!
//! Command output is logged under the `jobvisor::commands` target with a `job`
//! field, so it can be filtered separately from supervisor logs.

use std::fmt;
use std::str::FromStr;

use tracing::Subscriber;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Output format of the `fmt` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "default" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::Logging(format!("unknown log format '{other}'"))),
        }
    }
}

/// Level and format for the global subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `jobvisor=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LogConfig {
    /// Sets the filter directive.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// `RUST_LOG` if set, the configured level otherwise.
    pub fn filter(&self) -> Result<EnvFilter, ConfigError> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|err| ConfigError::Logging(format!("invalid level '{}': {err}", self.level)))
    }

    /// The `fmt` layer for the configured format.
    pub fn fmt_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        match self.format {
            LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        }
    }

    /// Installs the global subscriber; fails if one is already set.
    pub fn init(&self) -> Result<(), ConfigError> {
        tracing_subscriber::registry()
            .with(self.filter()?)
            .with(self.fmt_layer())
            .try_init()
            .map_err(|err| ConfigError::Logging(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("default".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!(LogFormat::Json.to_string(), "json");
        let err = "xml".parse::<LogFormat>().unwrap_err();
        assert_eq!(err.as_label(), "config_logging");
    }

    #[test]
    fn test_default_filter_builds() {
        let cfg = LogConfig::default().with_level("jobvisor=debug");
        assert!(cfg.filter().is_ok());
    }

    #[test]
    fn test_scoped_subscriber_applies_level() {
        let cfg = LogConfig::default().with_level("warn").with_format(LogFormat::Json);
        let filter = EnvFilter::try_new(&cfg.level).unwrap();
        let _scope = tracing_subscriber::registry()
            .with(filter)
            .with(cfg.fmt_layer())
            .set_default();

        assert!(tracing::enabled!(tracing::Level::WARN));
        assert!(!tracing::enabled!(tracing::Level::INFO));
    }
}
