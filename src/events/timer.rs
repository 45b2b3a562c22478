//! # Timer generators.
//!
//! Two pure producers that push `{TimerExpired, name}` straight into an
//! entity's own receive queue (not onto the bus):
//!
//! ```text
//! new_timer(ctx, tx, 10ms, "app.run-every")   ──► tick ──► tick ──► tick ──► ... until ctx cancelled
//! new_timeout(ctx, tx, 5s, "app.wait-timeout") ──► ................ fire once (unless cancelled)
//! ```
//!
//! Cancellation before firing is the only failure mode and is silent.
//! A closed queue also ends the generator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::event::{Event, EventCode};

/// Suffix of heartbeat timer sources; their ticks are not logged.
pub(crate) const HEARTBEAT_SUFFIX: &str = ".heartbeat";

/// Smallest period a recurring timer accepts.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Sends `{TimerExpired, name}` to `tx` once per `period` until `ctx` is cancelled.
///
/// The first tick fires one full period after the call.
pub fn new_timer(
    ctx: CancellationToken,
    tx: mpsc::Sender<Event>,
    period: Duration,
    name: impl Into<Arc<str>>,
) -> JoinHandle<()> {
    let period = period.max(MIN_PERIOD);
    let ev = Event::new(EventCode::TimerExpired, name);
    let quiet = ev.source.ends_with(HEARTBEAT_SUFFIX);

    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => {
                    if !quiet {
                        debug!(timer = %ev.source, "tick");
                    }
                    if !deliver(&ctx, &tx, ev.clone()).await {
                        break;
                    }
                }
            }
        }
    })
}

/// Sends a single `{TimerExpired, name}` to `tx` after `duration`, unless `ctx` is cancelled first.
pub fn new_timeout(
    ctx: CancellationToken,
    tx: mpsc::Sender<Event>,
    duration: Duration,
    name: impl Into<Arc<str>>,
) -> JoinHandle<()> {
    let ev = Event::new(EventCode::TimerExpired, name);

    tokio::spawn(async move {
        tokio::select! {
            _ = ctx.cancelled() => {}
            _ = time::sleep(duration) => {
                debug!(timer = %ev.source, "timeout fired");
                deliver(&ctx, &tx, ev).await;
            }
        }
    })
}

/// Returns false if the receiver is gone or the context was cancelled while waiting for room.
async fn deliver(ctx: &CancellationToken, tx: &mpsc::Sender<Event>, ev: Event) -> bool {
    tokio::select! {
        _ = ctx.cancelled() => false,
        res = tx.send(ev) => res.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_ticks_until_cancelled() {
        let ctx = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);
        let handle = new_timer(ctx.clone(), tx, Duration::from_millis(10), "app.run-every");

        let expected = Event::new(EventCode::TimerExpired, "app.run-every");
        for _ in 0..3 {
            assert_eq!(rx.recv().await, Some(expected.clone()));
        }
        ctx.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_once() {
        let ctx = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);
        let handle = new_timeout(ctx, tx, Duration::from_millis(100), "app.wait-timeout");

        assert_eq!(
            rx.recv().await,
            Some(Event::new(EventCode::TimerExpired, "app.wait-timeout"))
        );
        handle.await.unwrap();
        // sender dropped with the task: no second event
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timeout_is_silent() {
        let ctx = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);
        let handle = new_timeout(ctx.clone(), tx, Duration::from_secs(5), "app.wait-timeout");
        ctx.cancel();
        handle.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_when_queue_closes() {
        let ctx = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        let handle = new_timer(ctx, tx, Duration::from_millis(5), "check.db");
        drop(rx);
        handle.await.unwrap();
    }
}
