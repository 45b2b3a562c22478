//! # Events exchanged between jobs, watches and health checks.
//!
//! An [`Event`] is an immutable `(code, source)` pair: the [`EventCode`] says
//! what happened and the source names the entity that caused it. Two events
//! are equal iff both code and source match exactly, which is how entities
//! recognise their triggers:
//!
//! ```text
//! Job "app"    publishes  Event { ExitSuccess, "app" }
//! Job "app.post"  waits   Event { ExitSuccess, "app" }   ──► equal ──► start
//! ```
//!
//! Jobs refer to each other only through event values, never by reference,
//! so preStart/preStop/postStop chains cannot form ownership cycles.
//!
//! ## Example
//! ```rust
//! use jobvisor::{Event, EventCode};
//!
//! let ev = Event::new(EventCode::Stopping, "app");
//! assert_eq!(ev, Event::new(EventCode::Stopping, "app"));
//! assert_ne!(ev, Event::new(EventCode::Stopped, "app"));
//! assert_eq!("exitFailed".parse::<EventCode>().unwrap(), EventCode::ExitFailed);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ConfigError;

/// Source used by process-wide events.
pub const GLOBAL: &str = "global";

/// Source used by the close-induced quit event.
pub const CLOSED: &str = "closed";

/// Classification of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    /// A command completed with a zero exit code.
    ExitSuccess,
    /// A command completed with a non-zero exit code, failed to start or timed out.
    ExitFailed,
    /// An entity is about to stop.
    Stopping,
    /// An entity has stopped.
    Stopped,
    /// A health check passed for the named service.
    StatusHealthy,
    /// A health check failed for the named service.
    StatusUnhealthy,
    /// A watch saw an upstream change, or a check completed a run.
    StatusChanged,
    /// A timer generator fired.
    TimerExpired,
    /// Maintenance mode was entered.
    EnterMaintenance,
    /// Maintenance mode was left.
    ExitMaintenance,
    /// An error occurred; the source carries the message.
    Error,
    /// An entity was asked to quit.
    Quit,
    /// Fired once after all entities are running.
    Startup,
    /// Fired on SIGTERM or when a reload tears the workload down.
    Shutdown,
}

impl EventCode {
    /// Returns the configuration name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCode::ExitSuccess => "exitSuccess",
            EventCode::ExitFailed => "exitFailed",
            EventCode::Stopping => "stopping",
            EventCode::Stopped => "stopped",
            EventCode::StatusHealthy => "healthy",
            EventCode::StatusUnhealthy => "unhealthy",
            EventCode::StatusChanged => "changed",
            EventCode::TimerExpired => "timerExpired",
            EventCode::EnterMaintenance => "enterMaintenance",
            EventCode::ExitMaintenance => "exitMaintenance",
            EventCode::Error => "error",
            EventCode::Quit => "quit",
            EventCode::Startup => "startup",
            EventCode::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = match s {
            "exitSuccess" => EventCode::ExitSuccess,
            "exitFailed" => EventCode::ExitFailed,
            "stopping" => EventCode::Stopping,
            "stopped" => EventCode::Stopped,
            "healthy" => EventCode::StatusHealthy,
            "unhealthy" => EventCode::StatusUnhealthy,
            "changed" => EventCode::StatusChanged,
            "timerExpired" => EventCode::TimerExpired,
            "enterMaintenance" => EventCode::EnterMaintenance,
            "exitMaintenance" => EventCode::ExitMaintenance,
            "error" => EventCode::Error,
            "quit" => EventCode::Quit,
            "startup" => EventCode::Startup,
            "shutdown" => EventCode::Shutdown,
            other => return Err(ConfigError::InvalidEventCode(other.to_string())),
        };
        Ok(code)
    }
}

/// A single message on the [`EventBus`](crate::EventBus).
///
/// Cheap to clone: the source is an `Arc<str>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    /// What happened.
    pub code: EventCode,
    /// Which entity caused it.
    pub source: Arc<str>,
}

impl Event {
    /// Creates an event.
    pub fn new(code: EventCode, source: impl Into<Arc<str>>) -> Self {
        Self {
            code,
            source: source.into(),
        }
    }

    /// `{Startup, "global"}`: published once every entity is running.
    pub fn global_startup() -> Self {
        Self::new(EventCode::Startup, GLOBAL)
    }

    /// `{Shutdown, "global"}`: asks every entity to stop.
    pub fn global_shutdown() -> Self {
        Self::new(EventCode::Shutdown, GLOBAL)
    }

    /// `{EnterMaintenance, "global"}`.
    pub fn global_enter_maintenance() -> Self {
        Self::new(EventCode::EnterMaintenance, GLOBAL)
    }

    /// `{ExitMaintenance, "global"}`.
    pub fn global_exit_maintenance() -> Self {
        Self::new(EventCode::ExitMaintenance, GLOBAL)
    }

    /// `{Quit, "closed"}`: enqueued by [`EventHandler::quit`](crate::EventHandler::quit).
    pub fn quit_by_close() -> Self {
        Self::new(EventCode::Quit, CLOSED)
    }

    /// Returns true if the event was published for the whole process.
    #[inline]
    pub fn is_global(&self) -> bool {
        &*self.source == GLOBAL
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} {}}}", self.code, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_by_value() {
        let a = Event::new(EventCode::ExitSuccess, String::from("app"));
        let b = Event::new(EventCode::ExitSuccess, "app");
        assert_eq!(a, b);
        assert_ne!(a, Event::new(EventCode::ExitSuccess, "app2"));
        assert_eq!(Event::global_shutdown(), Event::new(EventCode::Shutdown, "global"));
        assert_ne!(Event::quit_by_close(), Event::new(EventCode::Quit, "app"));
    }

    #[test]
    fn test_parse_every_code() {
        let all = [
            EventCode::ExitSuccess,
            EventCode::ExitFailed,
            EventCode::Stopping,
            EventCode::Stopped,
            EventCode::StatusHealthy,
            EventCode::StatusUnhealthy,
            EventCode::StatusChanged,
            EventCode::TimerExpired,
            EventCode::EnterMaintenance,
            EventCode::ExitMaintenance,
            EventCode::Error,
            EventCode::Quit,
            EventCode::Startup,
            EventCode::Shutdown,
        ];
        for code in all {
            assert_eq!(code.as_str().parse::<EventCode>(), Ok(code));
        }
    }

    #[test]
    fn test_parse_unknown_code() {
        let err = "exploded".parse::<EventCode>().unwrap_err();
        assert_eq!(err, ConfigError::InvalidEventCode("exploded".into()));
    }

    #[test]
    fn test_display() {
        assert_eq!(Event::global_startup().to_string(), "{startup global}");
        assert!(Event::global_startup().is_global());
        assert!(!Event::new(EventCode::Startup, "app").is_global());
    }
}
