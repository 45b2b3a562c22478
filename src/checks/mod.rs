//! Health checks.
//!
//! - [`HealthCheckConfig`] the checked job, command and poll interval.
//! - [`HealthCheck`] runs the command on every tick and turns its exit into
//!   `StatusHealthy`/`StatusUnhealthy` for the job plus `StatusChanged` for itself.

mod check;
mod config;

pub use check::HealthCheck;
pub use config::HealthCheckConfig;
