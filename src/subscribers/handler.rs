//! # Reusable subscriber for run-loop entities.
//!
//! [`EventHandler`] gives a job, watch or check everything it needs to take
//! part in the bus: a bounded receive queue, registration, and a synchronous
//! quit rendezvous.
//!
//! ## Lifecycle
//! ```text
//! new()        ──► (handler, rx)           queue created, not yet on the bus
//! subscribe()  ──► bus.register(handler)   counted towards EventBus::wait
//!   ... run loop reads rx ...
//! quit()       ──► tx.send(QuitByClose) ──► run loop sees terminal event
//!                                          ├─ unsubscribe()
//!                                          ├─ drop(rx)          queue closed
//!                                          ├─ publish Stopped
//!                                          └─ flush()  ──► quit() returns
//! ```
//!
//! ## Rules
//! - Unsubscribe **before** closing the queue; the bus never sends to a
//!   closed queue on purpose. If it happens anyway it is logged at `error`.
//! - `quit()` returns only after `flush()`; a second call returns at once.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::error;

use super::subscriber::{Subscriber, SubscriberId};
use crate::events::{Event, EventBus, WeakEventBus};

/// Default receive queue capacity; sized for worst-case timer fan-in.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Receive queue plus bus membership for one entity.
pub struct EventHandler {
    id: SubscriberId,
    name: Arc<str>,
    bus: WeakEventBus,
    tx: mpsc::Sender<Event>,
    flushed: watch::Sender<bool>,
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flushed", &*self.flushed.borrow())
            .finish()
    }
}

impl EventHandler {
    /// Creates a handler and its receive queue. Capacity is clamped to at least 1.
    pub fn new(
        name: impl Into<Arc<str>>,
        bus: &EventBus,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (flushed, _) = watch::channel(false);
        let handler = Arc::new(Self {
            id: SubscriberId::next(),
            name: name.into(),
            bus: bus.downgrade(),
            tx,
            flushed,
        });
        (handler, rx)
    }

    /// Registers this handler on its bus.
    pub async fn subscribe(self: &Arc<Self>) {
        if let Some(bus) = self.bus.upgrade() {
            bus.register(self.clone()).await;
        }
    }

    /// Removes this handler from its bus.
    pub async fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unregister(self.id).await;
        }
    }

    /// The bus this handler belongs to, if it is still alive.
    pub fn bus(&self) -> Option<EventBus> {
        self.bus.upgrade()
    }

    /// A sender into this handler's own queue, for timers.
    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.tx.clone()
    }

    /// Enqueues without waiting; false if the queue is full or closed.
    pub fn try_enqueue(&self, ev: Event) -> bool {
        self.tx.try_send(ev).is_ok()
    }

    /// Asks the owning run loop to stop and waits until it has fully unwound.
    pub async fn quit(&self) {
        if self.is_flushed() {
            return;
        }
        // A closed queue means the loop is already tearing down; just wait for it.
        let _ = self.tx.send(Event::quit_by_close()).await;
        let mut rx = self.flushed.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Marks the run loop as fully stopped, releasing every `quit()` caller.
    pub(crate) fn flush(&self) {
        self.flushed.send_replace(true);
    }

    /// True once the owning run loop has finished its teardown.
    pub fn is_flushed(&self) -> bool {
        *self.flushed.borrow()
    }
}

#[async_trait]
impl Subscriber for EventHandler {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self, event: Event) {
        if let Err(err) = self.tx.send(event).await {
            error!(
                subscriber = %self.name,
                event = %err.0,
                "event delivered to a closed queue; unsubscribe must precede close"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventCode;
    use std::time::Duration;

    #[tokio::test]
    async fn test_quit_waits_for_flush() {
        let bus = EventBus::new();
        let (handler, mut rx) = EventHandler::new("app", &bus, 4);
        handler.subscribe().await;

        let loop_handler = handler.clone();
        let run = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                if ev == Event::quit_by_close() {
                    break;
                }
            }
            loop_handler.unsubscribe().await;
            drop(rx);
            tokio::time::sleep(Duration::from_millis(20)).await;
            loop_handler.flush();
        });

        handler.quit().await;
        assert!(handler.is_flushed());
        run.await.unwrap();
        assert_eq!(bus.subscriber_count(), 0);

        // second quit returns immediately
        tokio::time::timeout(Duration::from_millis(50), handler.quit())
            .await
            .expect("second quit must not block");
    }

    #[tokio::test]
    async fn test_receive_on_closed_queue_does_not_panic() {
        let bus = EventBus::new();
        let (handler, rx) = EventHandler::new("app", &bus, 4);
        drop(rx);
        handler.receive(Event::new(EventCode::Startup, "global")).await;
        assert!(!handler.try_enqueue(Event::global_shutdown()));
    }

    #[tokio::test]
    async fn test_try_enqueue_respects_capacity() {
        let bus = EventBus::new();
        let (handler, _rx) = EventHandler::new("app", &bus, 1);
        assert!(handler.try_enqueue(Event::global_startup()));
        assert!(!handler.try_enqueue(Event::global_startup()));
    }
}
