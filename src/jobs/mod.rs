//! Jobs: the general supervised unit.
//!
//! ## Contents
//! - [`JobConfig`], [`When`], [`Starts`] validated configuration and chain helpers
//! - [`link_stop_dependencies`] stopping-wait wiring for preStop-style jobs
//! - [`Job`] the run loop; [`JobHandle`] status reporting and control
//! - [`JobStatus`] health as seen by heartbeats and status reporting

mod config;
mod job;
mod status;

pub use config::{link_stop_dependencies, JobConfig, Starts, When};
pub use job::{Job, JobHandle};
pub use status::JobStatus;
