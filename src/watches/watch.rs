//! # Watch run loop.
//!
//! ```text
//! {TimerExpired, watch.db.poll} ──► backend.check_for_upstream_changes("db")
//!                                     ├─ changed   ──► publish StatusChanged{watch.db} ──► run on-change
//!                                     ├─ unchanged ──► nothing
//!                                     └─ error     ──► warn, treated as unchanged
//!
//! Quit{watch.db} / QuitByClose / GlobalShutdown ──► unsubscribe, cancel, close queue, flush
//! ```
//!
//! Watches have no dependents, so there is no stopping wait.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::WatchConfig;
use crate::commands::Command;
use crate::discovery::Discovery;
use crate::error::ConfigError;
use crate::events::{new_timer, Event, EventBus, EventCode};
use crate::subscribers::EventHandler;

/// Polls a discovery backend for upstream changes.
pub struct Watch {
    name: Arc<str>,
    service: String,
    tag: Option<String>,
    interval: Duration,
    exec: Option<Arc<Command>>,
    backend: Arc<dyn Discovery>,
    poll: Event,
    changed: Event,
    quit: Event,
    handler: Arc<EventHandler>,
    rx: mpsc::Receiver<Event>,
    bus: EventBus,
}

impl Watch {
    /// Validates `cfg` and builds a watch querying `backend`.
    pub fn new(
        cfg: &WatchConfig,
        backend: Arc<dyn Discovery>,
        bus: &EventBus,
        capacity: usize,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let name: Arc<str> = Arc::from(cfg.name());
        let exec = match cfg.on_change() {
            Some(raw) => Some(Arc::new(Command::parse(name.clone(), raw, cfg.timeout())?)),
            None => None,
        };
        let (handler, rx) = EventHandler::new(name.clone(), bus, capacity);

        Ok(Self {
            poll: Event::new(EventCode::TimerExpired, format!("{name}.poll")),
            changed: Event::new(EventCode::StatusChanged, name.clone()),
            quit: Event::new(EventCode::Quit, name.clone()),
            name,
            service: cfg.service().to_string(),
            tag: cfg.tag().map(str::to_string),
            interval: cfg.interval(),
            exec,
            backend,
            handler,
            rx,
            bus: bus.clone(),
        })
    }

    /// `watch.<service>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribes and starts the run loop; the returned handler can `quit()` it.
    pub async fn run(self, parent: &CancellationToken) -> Arc<EventHandler> {
        let handler = self.handler.clone();
        handler.subscribe().await;
        tokio::spawn(self.run_loop(parent.child_token()));
        handler
    }

    fn is_terminal(&self, ev: &Event) -> bool {
        *ev == self.quit || *ev == Event::quit_by_close() || *ev == Event::global_shutdown()
    }

    async fn run_loop(mut self, ctx: CancellationToken) {
        new_timer(ctx.clone(), self.handler.sender(), self.interval, self.poll.source.clone());
        debug!(watch = %self.name, "run loop started");

        loop {
            let ev = tokio::select! {
                _ = ctx.cancelled() => break,
                ev = self.rx.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };
            if self.is_terminal(&ev) {
                break;
            }
            if ev == self.poll {
                self.check(&ctx).await;
            }
        }

        self.handler.unsubscribe().await;
        ctx.cancel();
        if let Some(exec) = &self.exec {
            exec.close_logs();
        }
        self.rx.close();
        info!(watch = %self.name, "stopped");
        self.handler.flush();
    }

    async fn check(&self, ctx: &CancellationToken) {
        if self.exec.as_ref().is_some_and(|e| e.is_busy()) {
            debug!(watch = %self.name, "on-change still running, skipping poll");
            return;
        }
        let changed = match self
            .backend
            .check_for_upstream_changes(&self.service, self.tag.as_deref())
            .await
        {
            Ok(changed) => changed,
            Err(err) => {
                warn!(watch = %self.name, error = %err, label = err.as_label(), "upstream check failed");
                false
            }
        };
        if !changed {
            return;
        }
        debug!(watch = %self.name, "upstream changed");
        self.bus.publish(self.changed.clone()).await;
        if let Some(exec) = &self.exec {
            exec.run(ctx, &self.bus);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::fake::{Call, FakeDiscovery};
    use crate::error::DiscoveryError;
    use crate::subscribers::{Recorder, DEFAULT_QUEUE_CAPACITY};

    #[tokio::test]
    async fn test_change_publishes_and_runs_on_change() {
        let bus = EventBus::new();
        let rec = Recorder::new("rec");
        bus.register_internal(rec.clone()).await;

        let backend = Arc::new(FakeDiscovery::default());
        backend.script_upstream([
            Ok(false),
            Err(DiscoveryError::Unavailable("refused".into())),
            Ok(true),
        ]);
        let cfg = WatchConfig::new("db", Duration::from_millis(10)).with_on_change("true");
        let watch = Watch::new(&cfg, backend.clone(), &bus, DEFAULT_QUEUE_CAPACITY).unwrap();
        let handler = watch.run(&CancellationToken::new()).await;

        let success = Event::new(EventCode::ExitSuccess, "watch.db");
        assert!(rec.wait_for(&success, Duration::from_secs(5)).await);
        assert_eq!(rec.count(&Event::new(EventCode::StatusChanged, "watch.db")), 1);
        assert!(backend.count(&Call::Upstream("db".into())) >= 3);

        handler.quit().await;
        assert!(handler.is_flushed());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_global_shutdown_stops_watch() {
        let bus = EventBus::new();
        let backend = Arc::new(FakeDiscovery::default());
        let cfg = WatchConfig::new("cache", Duration::from_secs(60));
        let handler = Watch::new(&cfg, backend, &bus, DEFAULT_QUEUE_CAPACITY)
            .unwrap()
            .run(&CancellationToken::new())
            .await;
        assert_eq!(bus.subscriber_count(), 1);

        bus.shutdown().await;
        assert!(!tokio::time::timeout(Duration::from_secs(5), bus.wait()).await.unwrap());
        handler.quit().await;
    }
}
