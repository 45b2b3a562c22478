//! Watches: react to upstream topology changes.
//!
//! - [`WatchConfig`] names the upstream service, poll interval and optional on-change command.
//! - [`Watch`] polls the [`Discovery`](crate::Discovery) backend and publishes
//!   `StatusChanged{watch.<service>}` when the upstream set changes. Jobs that
//!   start `each` on that event are the usual consumers.

mod config;
mod watch;

pub use config::WatchConfig;
pub use watch::Watch;
