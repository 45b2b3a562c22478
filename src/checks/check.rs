//! # Health check run loop.
//!
//! ```text
//! {TimerExpired, check.web.poll} ──► run exec
//! {ExitSuccess, check.web}       ──► publish StatusHealthy{web},   StatusChanged{check.web}
//! {ExitFailed,  check.web}       ──► publish StatusUnhealthy{web}, StatusChanged{check.web}
//!
//! Quit{check.web} / Stopped{web} / QuitByClose / GlobalShutdown ──► teardown
//! ```
//!
//! A poll that arrives while the previous run is still in flight is skipped.
//! The check never restarts anything or talks to discovery; the job named
//! `web` consumes the status events and heartbeats on its own.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::HealthCheckConfig;
use crate::commands::Command;
use crate::error::ConfigError;
use crate::events::{new_timer, Event, EventBus, EventCode};
use crate::subscribers::EventHandler;

enum Input {
    Poll,
    Passed,
    Failed,
    Stop,
    Ignore,
}

/// Periodically runs a command and reports the checked job's health.
pub struct HealthCheck {
    name: Arc<str>,
    interval: Duration,
    exec: Arc<Command>,
    poll: Event,
    passed: Event,
    failed: Event,
    quit: Event,
    service_stopped: Event,
    healthy: Event,
    unhealthy: Event,
    changed: Event,
    handler: Arc<EventHandler>,
    rx: mpsc::Receiver<Event>,
    bus: EventBus,
}

impl HealthCheck {
    /// Validates `cfg` and builds the check.
    pub fn new(cfg: &HealthCheckConfig, bus: &EventBus, capacity: usize) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let name: Arc<str> = Arc::from(cfg.name());
        let service = cfg.service();
        let exec = Arc::new(Command::parse(name.clone(), cfg.exec(), cfg.timeout())?);
        let (handler, rx) = EventHandler::new(name.clone(), bus, capacity);

        Ok(Self {
            poll: Event::new(EventCode::TimerExpired, format!("{name}.poll")),
            passed: Event::new(EventCode::ExitSuccess, name.clone()),
            failed: Event::new(EventCode::ExitFailed, name.clone()),
            quit: Event::new(EventCode::Quit, name.clone()),
            changed: Event::new(EventCode::StatusChanged, name.clone()),
            service_stopped: Event::new(EventCode::Stopped, service),
            healthy: Event::new(EventCode::StatusHealthy, service),
            unhealthy: Event::new(EventCode::StatusUnhealthy, service),
            name,
            interval: cfg.interval(),
            exec,
            handler,
            rx,
            bus: bus.clone(),
        })
    }

    /// `check.<service>`.
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

    fn classify(&self, ev: &Event) -> Input {
        if *ev == self.poll {
            Input::Poll
        } else if *ev == self.passed {
            Input::Passed
        } else if *ev == self.failed {
            Input::Failed
        } else if *ev == self.quit
            || *ev == self.service_stopped
            || *ev == Event::quit_by_close()
            || *ev == Event::global_shutdown()
        {
            Input::Stop
        } else {
            Input::Ignore
        }
    }

    async fn run_loop(mut self, ctx: CancellationToken) {
        new_timer(ctx.clone(), self.handler.sender(), self.interval, self.poll.source.clone());
        debug!(check = %self.name, "run loop started");

        loop {
            let ev = tokio::select! {
                _ = ctx.cancelled() => break,
                ev = self.rx.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };
            match self.classify(&ev) {
                Input::Poll if self.exec.is_busy() => {
                    debug!(check = %self.name, "previous run still in flight, skipping poll");
                }
                Input::Poll => {
                    self.exec.run(&ctx, &self.bus);
                }
                Input::Passed => {
                    self.bus.publish(self.healthy.clone()).await;
                    self.bus.publish(self.changed.clone()).await;
                }
                Input::Failed => {
                    self.bus.publish(self.unhealthy.clone()).await;
                    self.bus.publish(self.changed.clone()).await;
                }
                Input::Stop => break,
                Input::Ignore => {}
            }
        }

        self.handler.unsubscribe().await;
        ctx.cancel();
        self.exec.close_logs();
        self.rx.close();
        info!(check = %self.name, "stopped");
        self.handler.flush();
    }
}
