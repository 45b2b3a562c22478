//! # Subscriber trait.
//!
//! Anything registered on the [`EventBus`](crate::EventBus) implements
//! [`Subscriber`]. The bus calls [`Subscriber::receive`] inline from
//! `publish`, so implementations must only enqueue or record, never do work.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use jobvisor::{Event, Subscriber, SubscriberId};
//!
//! struct Counter { id: SubscriberId }
//!
//! #[async_trait]
//! impl Subscriber for Counter {
//!     fn id(&self) -> SubscriberId { self.id }
//!     fn name(&self) -> &str { "counter" }
//!     async fn receive(&self, _event: Event) {}
//! }
//!
//! let c = Counter { id: SubscriberId::next() };
//! assert_ne!(c.id(), SubscriberId::next());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::events::Event;

static SUBSCRIBER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique subscriber identity; the bus keys its registry by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocates the next id.
    pub fn next() -> Self {
        Self(SUBSCRIBER_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receiver of bus events.
///
/// ### Implementation requirements
/// - `receive` runs in the publisher's context: enqueue and return.
/// - Waiting inside `receive` is backpressure on every publisher.
/// - `id` must be stable for the lifetime of the value.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Stable identity used by the bus registry.
    fn id(&self) -> SubscriberId;

    /// Name used in logs.
    fn name(&self) -> &str;

    /// Accepts one event.
    async fn receive(&self, event: Event);
}
