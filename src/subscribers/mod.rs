//! # Bus subscribers.
//!
//! This module provides the [`Subscriber`] trait and the two built-in
//! implementations every other module composes.
//!
//! ## Architecture
//! ```text
//! EventBus::publish(ev)
//!     │
//!     ├──► EventHandler::receive ──► [bounded queue] ──► Job / Watch / HealthCheck loop
//!     │
//!     └──► Recorder::receive     ──► Vec<Event> (status, tests)
//! ```
//!
//! ## Subscriber types
//! - **Entity subscribers**: [`EventHandler`], embedded by delegation in every run-loop entity.
//! - **Administrative subscribers**: [`Recorder`], registered with `register_internal`.

mod handler;
mod recorder;
mod subscriber;

pub use handler::{EventHandler, DEFAULT_QUEUE_CAPACITY};
pub use recorder::Recorder;
pub use subscriber::{Subscriber, SubscriberId};
