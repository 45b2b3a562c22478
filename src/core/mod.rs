//! Runtime core: workload loading, lifecycle and OS signals.
//!
//! The public API from this module is [`Supervisor`] plus the types it consumes.
//!
//! Internal modules:
//! - [`config`]: runtime-wide settings;
//! - [`workload`]: the entities of one generation and the [`Loader`] that builds them;
//! - [`supervisor`]: starts a generation, waits for the bus to drain, reloads or exits;
//! - [`signals`]: maps SIGTERM/SIGINT, SIGHUP and SIGUSR1 onto supervisor controls.

mod config;
mod signals;
mod supervisor;
mod workload;

pub use config::SupervisorConfig;
pub use supervisor::Supervisor;
pub use workload::{Loader, Workload};
