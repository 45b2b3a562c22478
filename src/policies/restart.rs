//! # Restart policies for jobs.
//!
//! [`RestartPolicy`] says how many times a job may run again after its first run.
//! It is the normalized form of the `restarts` setting:
//!
//! ```text
//! "never"     / 0   → RestartPolicy::Never       first exit stops the job
//! N > 0             → RestartPolicy::Times(N)    exactly N more runs
//! "unlimited" / -1  → RestartPolicy::Unlimited   never exhausted by count
//! ```
//!
//! [`RestartBudget`] is the mutable counter a running job keeps. It is only
//! touched from the job's own run loop.
//!
//! ## Example
//! ```rust
//! use jobvisor::{RestartBudget, RestartPolicy};
//!
//! let mut budget = RestartBudget::new("2".parse::<RestartPolicy>().unwrap());
//! assert!(budget.consume());
//! assert!(budget.consume());
//! assert!(!budget.consume());
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// How many times a job may be restarted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    /// Run once; the first exit stops the job.
    #[default]
    Never,
    /// Restart exactly this many times after the first run.
    Times(u32),
    /// Restart forever.
    Unlimited,
}

impl RestartPolicy {
    /// Builds a policy from the numeric form: `-1` unlimited, `0` never, `N` times.
    ///
    /// Any other negative number is treated as unlimited.
    pub fn from_limit(limit: i64) -> Self {
        match limit {
            l if l < 0 => RestartPolicy::Unlimited,
            0 => RestartPolicy::Never,
            l => RestartPolicy::Times(u32::try_from(l).unwrap_or(u32::MAX)),
        }
    }

    /// The numeric form: `-1`, `0` or `N`.
    pub fn limit(&self) -> i64 {
        match self {
            RestartPolicy::Never => 0,
            RestartPolicy::Times(n) => i64::from(*n),
            RestartPolicy::Unlimited => -1,
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPolicy::Never => f.write_str("never"),
            RestartPolicy::Times(n) => write!(f, "{n}"),
            RestartPolicy::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Error returned when a restart setting cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{0}' must be a non-negative integer, \"never\" or \"unlimited\"")]
pub struct ParseRestartPolicyError(pub String);

impl ParseRestartPolicyError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        "restart_policy_parse"
    }
}

impl FromStr for RestartPolicy {
    type Err = ParseRestartPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "unlimited" => Ok(RestartPolicy::Unlimited),
            "never" => Ok(RestartPolicy::Never),
            other => other
                .parse::<u32>()
                .map(|n| if n == 0 { RestartPolicy::Never } else { RestartPolicy::Times(n) })
                .map_err(|_| ParseRestartPolicyError(s.to_string())),
        }
    }
}

/// Remaining restarts of a running job.
#[derive(Clone, Copy, Debug)]
pub struct RestartBudget {
    policy: RestartPolicy,
    remaining: u32,
    halted: bool,
}

impl RestartBudget {
    /// A full budget for `policy`.
    pub fn new(policy: RestartPolicy) -> Self {
        let remaining = match policy {
            RestartPolicy::Times(n) => n,
            _ => 0,
        };
        Self {
            policy,
            remaining,
            halted: false,
        }
    }

    /// True if another restart is allowed.
    pub fn permitted(&self) -> bool {
        if self.halted {
            return false;
        }
        match self.policy {
            RestartPolicy::Unlimited => true,
            _ => self.remaining > 0,
        }
    }

    /// Takes one restart from the budget; false if none was left.
    pub fn consume(&mut self) -> bool {
        if !self.permitted() {
            return false;
        }
        if self.policy != RestartPolicy::Unlimited {
            self.remaining -= 1;
        }
        true
    }

    /// Zeroes the budget; no further restarts, even for unlimited policies.
    pub fn exhaust(&mut self) {
        self.remaining = 0;
        self.halted = true;
    }

    /// Restarts left, or `None` when unlimited and not exhausted.
    pub fn remaining(&self) -> Option<u32> {
        match self.policy {
            RestartPolicy::Unlimited if !self.halted => None,
            RestartPolicy::Unlimited => Some(0),
            _ => Some(self.remaining),
        }
    }

    /// The policy this budget was created from.
    pub fn policy(&self) -> RestartPolicy {
        self.policy
    }
}
