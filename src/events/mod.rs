//! Events: data model, bus and timer generators.
//!
//! ## Contents
//! - [`EventCode`], [`Event`] value-compared `(code, source)` pairs
//! - [`EventBus`] synchronous multicast registry with a drain signal
//! - [`new_timer`], [`new_timeout`] producers of `TimerExpired` events
//!
//! ## Quick reference
//! - **Publishers**: jobs, watches, checks, commands, the supervisor and its signal listener.
//! - **Consumers**: every [`EventHandler`](crate::EventHandler) registered on the bus.
//!
//! See the crate root for the system-level wiring diagram.

mod bus;
mod event;
mod timer;

pub use bus::{EventBus, WeakEventBus, DEFAULT_HISTORY};
pub use event::{Event, EventCode, CLOSED, GLOBAL};
pub(crate) use timer::HEARTBEAT_SUFFIX;
pub use timer::{new_timeout, new_timer, MIN_PERIOD};
