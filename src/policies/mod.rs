//! Restart policies.
//!
//! ## Contents
//! - [`RestartPolicy`] how often a job may run again (never / N times / unlimited)
//! - [`RestartBudget`] the per-run-loop counter derived from a policy
//!
//! ## Quick wiring
//! ```text
//! JobConfig { restarts: Option<RestartPolicy>, interval, .. }
//!      └─► Job keeps a RestartBudget:
//!           - exit event      → budget.consume() ? restart : stop
//!           - run-every tick  → budget.consume() ? re-fire : stop
//!           - global shutdown → budget.exhaust() for preStop/postStop jobs
//! ```
//!
//! ## Defaults
//! - `RestartPolicy::Unlimited` for periodic jobs, `RestartPolicy::Never` otherwise.

mod restart;

pub use restart::{ParseRestartPolicyError, RestartBudget, RestartPolicy};
