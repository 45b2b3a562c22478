//! External command execution.
//!
//! ## Contents
//! - [`Command`] spawn, stream logs, enforce a timeout, report exit status on the bus
//! - [`parse_args`] split a command line into executable and arguments
//! - [`reap_children`] collect zombies of one process group
//!
//! Jobs, watches and health checks each own at most one `Arc<Command>` and
//! share it with nothing else; its event source is the owner's name.

mod args;
mod command;
mod reaper;

pub use args::parse_args;
pub use command::Command;
pub use reaper::reap_children;
