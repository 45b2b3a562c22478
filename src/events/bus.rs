//! # Event bus shared by every job, watch and health check.
//!
//! [`EventBus`] is a registry of [`Subscriber`]s with synchronous fan-out:
//! `publish` returns only after it attempted delivery to every subscriber that
//! was registered when the call started.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                       Subscribers (many):
//!   Job "app"   ──┐                    ┌──► EventHandler "app"   ──► [queue] ──► run loop
//!   Command     ──┼──► EventBus ───────┼──► EventHandler "check.app" ──► ...
//!   Signals     ──┘  (RwLock<map>)     └──► Recorder (internal, uncounted)
//! ```
//!
//! ## Rules
//! - `publish` holds the read lock for the whole fan-out; concurrent publishes are fine.
//! - `register`/`unregister` take the write lock.
//! - A full subscriber queue makes `publish` wait (backpressure, never a drop).
//! - Only counted subscribers take part in the drain signal; `register_internal`
//!   adds administrative subscribers that never keep the process alive.
//! - [`EventBus::wait`] resolves once the counted set is empty and reports
//!   whether a reload was requested in the meantime.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{watch, RwLock};
use tracing::debug;

use super::event::Event;
use crate::subscribers::{Subscriber, SubscriberId};

/// Number of recently published events kept for status reporting.
pub const DEFAULT_HISTORY: usize = 10;

struct Entry {
    sub: Arc<dyn Subscriber>,
    counted: bool,
}

struct Inner {
    subscribers: RwLock<HashMap<SubscriberId, Entry>>,
    reload: AtomicBool,
    active: watch::Sender<usize>,
    history: Mutex<VecDeque<Event>>,
    history_cap: usize,
}

/// Multicast registry of subscribers.
///
/// Cheap to clone; all clones share the same subscriber set.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

/// Non-owning reference to an [`EventBus`], held by subscribers.
#[derive(Clone)]
pub struct WeakEventBus {
    inner: Weak<Inner>,
}

impl WeakEventBus {
    /// Returns the bus if it is still alive.
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("active", &*self.inner.active.borrow())
            .field("reload", &self.inner.reload.load(Ordering::SeqCst))
            .finish()
    }
}

impl EventBus {
    /// Creates a bus with the default history size.
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    /// Creates a bus keeping the last `history` published events.
    pub fn with_history(history: usize) -> Self {
        let (active, _) = watch::channel(0usize);
        Self {
            inner: Arc::new(Inner {
                subscribers: RwLock::new(HashMap::new()),
                reload: AtomicBool::new(false),
                active,
                history: Mutex::new(VecDeque::with_capacity(history)),
                history_cap: history,
            }),
        }
    }

    /// Returns a non-owning reference to this bus.
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers a subscriber that counts towards the drain signal.
    ///
    /// Registering the same subscriber twice is absorbed silently.
    pub async fn register(&self, sub: Arc<dyn Subscriber>) {
        self.insert(sub, true).await;
    }

    /// Registers an administrative subscriber that never delays [`EventBus::wait`].
    pub async fn register_internal(&self, sub: Arc<dyn Subscriber>) {
        self.insert(sub, false).await;
    }

    async fn insert(&self, sub: Arc<dyn Subscriber>, counted: bool) {
        let id = sub.id();
        let mut map = self.inner.subscribers.write().await;
        if map.contains_key(&id) {
            return;
        }
        debug!(subscriber = sub.name(), counted, "registered");
        map.insert(id, Entry { sub, counted });
        if counted {
            self.inner.active.send_modify(|n| *n += 1);
        }
    }

    /// Removes a subscriber; publishes started afterwards no longer reach it.
    ///
    /// When the last counted subscriber leaves, the drain signal fires.
    pub async fn unregister(&self, id: SubscriberId) {
        let mut map = self.inner.subscribers.write().await;
        let Some(entry) = map.remove(&id) else {
            return;
        };
        debug!(subscriber = entry.sub.name(), "unregistered");
        if entry.counted {
            self.inner.active.send_modify(|n| *n = n.saturating_sub(1));
            if *self.inner.active.borrow() == 0 {
                debug!("all subscribers drained");
            }
        }
    }

    /// Delivers `ev` to every registered subscriber.
    ///
    /// With no subscribers this is a no-op that never waits.
    pub async fn publish(&self, ev: Event) {
        debug!(code = %ev.code, source = %ev.source, "event");
        self.record(&ev);

        let map = self.inner.subscribers.read().await;
        for entry in map.values() {
            entry.sub.receive(ev.clone()).await;
        }
    }

    /// Publishes `GlobalShutdown`.
    pub async fn shutdown(&self) {
        self.publish(Event::global_shutdown()).await;
    }

    /// Marks the coming drain as a reload rather than an exit.
    pub fn set_reload_flag(&self) {
        self.inner.reload.store(true, Ordering::SeqCst);
    }

    /// Clears the reload flag before a new workload is started.
    pub fn clear_reload_flag(&self) {
        self.inner.reload.store(false, Ordering::SeqCst);
    }

    /// Returns true if a reload was requested.
    pub fn reload_requested(&self) -> bool {
        self.inner.reload.load(Ordering::SeqCst)
    }

    /// Waits until no counted subscriber remains, then returns the reload flag.
    pub async fn wait(&self) -> bool {
        let mut rx = self.inner.active.subscribe();
        // The sender lives in `inner`, so the channel cannot close while we borrow it.
        let _ = rx.wait_for(|n| *n == 0).await;
        self.reload_requested()
    }

    /// Number of counted subscribers currently registered.
    pub fn subscriber_count(&self) -> usize {
        *self.inner.active.borrow()
    }

    /// The most recently published events, oldest first.
    pub fn recent_events(&self) -> Vec<Event> {
        match self.inner.history.lock() {
            Ok(h) => h.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    fn record(&self, ev: &Event) {
        if self.inner.history_cap == 0 {
            return;
        }
        let mut h = match self.inner.history.lock() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        if h.len() == self.inner.history_cap {
            h.pop_front();
        }
        h.push_back(ev.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventCode;
    use crate::subscribers::{EventHandler, Recorder};
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        tokio::time::timeout(Duration::from_millis(100), bus.publish(Event::global_startup()))
            .await
            .expect("publish must not block");
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_subscriber_is_not_reached() {
        let bus = EventBus::new();
        let (handler, mut rx) = EventHandler::new("app", &bus, 8);
        handler.subscribe().await;
        handler.unsubscribe().await;

        bus.publish(Event::new(EventCode::Startup, "global")).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_register_counts_once() {
        let bus = EventBus::new();
        let (handler, _rx) = EventHandler::new("app", &bus, 8);
        handler.subscribe().await;
        handler.subscribe().await;
        assert_eq!(bus.subscriber_count(), 1);
        handler.unsubscribe().await;
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_reports_reload_after_drain() {
        let bus = EventBus::new();
        let recorder = Recorder::new("recorder");
        bus.register_internal(recorder.clone()).await;

        let (handler, _rx) = EventHandler::new("app", &bus, 8);
        handler.subscribe().await;

        let waiter = tokio::spawn({
            let bus = bus.clone();
            async move { bus.wait().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "internal subscriber must not count, app still registered");

        bus.set_reload_flag();
        handler.unsubscribe().await;
        assert!(waiter.await.unwrap());

        bus.clear_reload_flag();
        assert!(!bus.wait().await);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let bus = EventBus::with_history(3);
        for i in 0..5 {
            bus.publish(Event::new(EventCode::Error, format!("e{i}"))).await;
        }
        let recent: Vec<_> = bus.recent_events().into_iter().map(|e| e.source.to_string()).collect();
        assert_eq!(recent, vec!["e2", "e3", "e4"]);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let (a, mut rx_a) = EventHandler::new("a", &bus, 8);
        let (b, mut rx_b) = EventHandler::new("b", &bus, 8);
        a.subscribe().await;
        b.subscribe().await;

        bus.shutdown().await;
        assert_eq!(rx_a.try_recv().unwrap(), Event::global_shutdown());
        assert_eq!(rx_b.try_recv().unwrap(), Event::global_shutdown());
    }
}
