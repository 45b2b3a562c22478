//! # In-memory event recorder.
//!
//! [`Recorder`] keeps every event it receives. Register it with
//! [`EventBus::register_internal`](crate::EventBus::register_internal) so it
//! never delays the drain signal. Used by status reporting and by tests to
//! observe bus traffic in order.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{self, Instant};

use super::subscriber::{Subscriber, SubscriberId};
use crate::events::Event;

/// Subscriber that records events in arrival order.
#[derive(Debug)]
pub struct Recorder {
    id: SubscriberId,
    name: String,
    events: Mutex<Vec<Event>>,
    notify: Notify,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: SubscriberId::next(),
            name: name.into(),
            events: Mutex::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        match self.events.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// How many times `ev` was seen.
    pub fn count(&self, ev: &Event) -> usize {
        self.lock().iter().filter(|e| *e == ev).count()
    }

    /// Index of the first occurrence of `ev`.
    pub fn position(&self, ev: &Event) -> Option<usize> {
        self.lock().iter().position(|e| e == ev)
    }

    /// Waits up to `timeout` for `ev` to be recorded at least once.
    pub async fn wait_for(&self, ev: &Event, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.count(ev) > 0 {
                return true;
            }
            if time::timeout_at(deadline, notified).await.is_err() {
                return self.count(ev) > 0;
            }
        }
    }
}

#[async_trait]
impl Subscriber for Recorder {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self, event: Event) {
        self.lock().push(event);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, EventCode};

    #[tokio::test]
    async fn test_wait_for_sees_later_event() {
        let bus = EventBus::new();
        let rec = Recorder::new("rec");
        bus.register_internal(rec.clone()).await;

        let ev = Event::new(EventCode::Stopped, "app");
        let publisher = {
            let bus = bus.clone();
            let ev = ev.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                bus.publish(ev).await;
            })
        };
        assert!(rec.wait_for(&ev, Duration::from_secs(1)).await);
        publisher.await.unwrap();
        assert_eq!(rec.count(&ev), 1);
        assert_eq!(rec.position(&ev), Some(0));
        assert!(!rec.wait_for(&Event::global_shutdown(), Duration::from_millis(10)).await);
    }
}
