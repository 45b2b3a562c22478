//! # Supervisor configuration.
//!
//! [`SupervisorConfig`] holds the runtime-wide settings that do not belong to
//! any single job:
//!
//! - `stop_timeout`: how long commands may keep running after the bus drained
//!   before they are SIGKILLed.
//! - `queue_capacity`: receive queue size of every job, watch and check.
//! - `history`: number of recent events the bus keeps for status reporting.
//! - `handle_signals`: whether `run` installs the OS signal listener.

use std::time::Duration;

use crate::events::DEFAULT_HISTORY;
use crate::subscribers::DEFAULT_QUEUE_CAPACITY;

/// Runtime-wide settings for [`Supervisor`](crate::Supervisor).
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Grace given to running commands once every entity has stopped.
    pub stop_timeout: Duration,

    /// Capacity of each entity's receive queue (min 1).
    pub queue_capacity: usize,

    /// Length of the bus history ring.
    pub history: usize,

    /// Map SIGTERM/SIGINT, SIGHUP and SIGUSR1 onto terminate, reload and maintenance.
    pub handle_signals: bool,
}

impl SupervisorConfig {
    /// Sets the stop timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Sets the per-entity queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the bus history length.
    pub fn with_history(mut self, history: usize) -> Self {
        self.history = history;
        self
    }

    /// Enables or disables the OS signal listener.
    pub fn with_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// - `stop_timeout = 5s`
    /// - `queue_capacity = 1000`
    /// - `history = 10`
    /// - `handle_signals = true`
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(5),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            history: DEFAULT_HISTORY,
            handle_signals: true,
        }
    }
}
