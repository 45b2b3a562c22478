//! # Job run loop.
//!
//! A [`Job`] owns one task that reads its receive queue and drives this state machine:
//!
//! ```text
//! WaitingForStart ──start trigger──► Running ──ExitSuccess/ExitFailed{self}──┐
//!        │                              ▲                                      │
//!        │                              └── restart permitted ◄────────────────┤
//!        │                                                                     │
//!        └── wait-timeout / Quit{self} / QuitByClose / GlobalShutdown ──► Stopping ──► Stopped
//!
//! orthogonal: heartbeat tick, healthy/unhealthy{self}, enter/exit maintenance
//! ```
//!
//! ## Event matching
//! Every source string the job reacts to is computed once in [`Job::new`];
//! the loop classifies each incoming event into an `Input` and handles it
//! in one exhaustive match.
//!
//! ## Stopping sequence (runs once)
//! 1. publish `Stopping{self}`
//! 2. if a stopping-wait event is configured, wait for it or for the stopping timeout
//! 3. cancel the job token (SIGTERM to a running command)
//! 4. unsubscribe, deregister from discovery, close command logs, close the queue
//! 5. publish `Stopped{self}`, then release every `quit()` caller
//!
//! ## Rules
//! - Periodic jobs ignore their own exit events; only the run-every tick re-fires them.
//! - `Never` restarts: the first exit stops the job (unless `Each` starts remain).
//! - Jobs started by another job's `Stopping`/`Stopped` ignore `GlobalShutdown`
//!   and stop after their own run; `Quit{self}` always stops them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{JobConfig, Starts};
use super::status::JobStatus;
use crate::commands::Command;
use crate::discovery::{Advertisement, ServiceDefinition};
use crate::error::ConfigError;
use crate::events::{new_timeout, new_timer, Event, EventBus, EventCode, HEARTBEAT_SUFFIX};
use crate::policies::RestartBudget;
use crate::subscribers::EventHandler;

/// Whether the loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Halt,
}

/// What an incoming event means to this job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Heartbeat,
    StartTimeout,
    RunEvery,
    Quit,
    Shutdown,
    EnterMaintenance,
    ExitMaintenance,
    Exited,
    Healthy,
    Unhealthy,
    Start,
    Ignore,
}

/// Events the job matches against, computed once.
#[derive(Debug)]
struct Sources {
    run_every: Event,
    heartbeat: Event,
    start_timeout: Event,
    stopping_timeout: Event,
    quit: Event,
    exit_success: Event,
    exit_failed: Event,
    healthy: Event,
    unhealthy: Event,
    timer_expired: Event,
    stopping: Event,
    stopped: Event,
}

impl Sources {
    fn new(name: &str) -> Self {
        Self {
            run_every: Event::new(EventCode::TimerExpired, format!("{name}.run-every")),
            heartbeat: Event::new(EventCode::TimerExpired, format!("{name}{HEARTBEAT_SUFFIX}")),
            start_timeout: Event::new(EventCode::TimerExpired, format!("{name}.wait-timeout")),
            stopping_timeout: Event::new(EventCode::TimerExpired, format!("{name}.stopping-timeout")),
            quit: Event::new(EventCode::Quit, name),
            exit_success: Event::new(EventCode::ExitSuccess, name),
            exit_failed: Event::new(EventCode::ExitFailed, name),
            healthy: Event::new(EventCode::StatusHealthy, name),
            unhealthy: Event::new(EventCode::StatusUnhealthy, name),
            timer_expired: Event::new(EventCode::TimerExpired, name),
            stopping: Event::new(EventCode::Stopping, name),
            stopped: Event::new(EventCode::Stopped, name),
        }
    }
}

/// State shared between the run loop and its handles.
#[derive(Debug)]
struct Shared {
    status: RwLock<JobStatus>,
    complete: AtomicBool,
}

impl Shared {
    async fn set_status(&self, status: JobStatus) {
        let mut current = self.status.write().await;
        if *current != JobStatus::AlwaysHealthy {
            *current = status;
        }
    }
}

/// A supervised unit built from a [`JobConfig`].
pub struct Job {
    name: Arc<str>,
    exec: Option<Arc<Command>>,
    service: Option<Advertisement>,
    heartbeat: Option<Duration>,
    interval: Option<Duration>,
    start_event: Option<Event>,
    start_timeout: Option<Duration>,
    start_timeout_armed: bool,
    /// Started by another job's `Stopping`/`Stopped`.
    stop_triggered: bool,
    /// `None` means unlimited starts.
    starts_remain: Option<u32>,
    restarts: RestartBudget,
    stopping_wait: Option<Event>,
    stopping_timeout: Option<Duration>,
    sources: Sources,
    shared: Arc<Shared>,
    handler: Arc<EventHandler>,
    rx: mpsc::Receiver<Event>,
    bus: EventBus,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("start_event", &self.start_event)
            .field("starts_remain", &self.starts_remain)
            .field("restarts", &self.restarts)
            .finish_non_exhaustive()
    }
}

impl Job {
    /// Validates `cfg` and builds a job bound to `bus` with a receive queue of `capacity`.
    pub fn new(cfg: &JobConfig, bus: &EventBus, capacity: usize) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let name: Arc<str> = Arc::from(cfg.name());

        let exec = match cfg.exec() {
            Some(raw) => {
                let (uid, gid) = cfg.user();
                let cmd = Command::parse(name.clone(), raw, cfg.exec_timeout())?.with_user(uid, gid);
                Some(Arc::new(cmd))
            }
            None => None,
        };

        let starts_remain = match cfg.when().starts {
            Starts::Once => Some(1),
            Starts::Each => None,
        };
        let status = if cfg.is_always_healthy() {
            JobStatus::AlwaysHealthy
        } else {
            JobStatus::Idle
        };
        let (handler, rx) = EventHandler::new(name.clone(), bus, capacity);

        Ok(Self {
            sources: Sources::new(&name),
            name,
            exec,
            service: cfg.service().cloned(),
            heartbeat: cfg.heartbeat(),
            interval: cfg.interval(),
            start_event: Some(cfg.when().event.clone()),
            start_timeout: cfg.when().timeout,
            start_timeout_armed: false,
            stop_triggered: matches!(
                cfg.when().event.code,
                EventCode::Stopping | EventCode::Stopped
            ),
            starts_remain,
            restarts: RestartBudget::new(cfg.restarts()),
            stopping_wait: cfg.stopping_wait().cloned(),
            stopping_timeout: cfg.stopping_timeout(),
            shared: Arc::new(Shared {
                status: RwLock::new(status),
                complete: AtomicBool::new(false),
            }),
            handler,
            rx,
            bus: bus.clone(),
        })
    }

    /// Job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> JobHandle {
        JobHandle {
            name: self.name.clone(),
            shared: self.shared.clone(),
            service: self.service.clone(),
            exec: self.exec.clone(),
            handler: self.handler.clone(),
        }
    }

    /// Subscribes to the bus and starts the run loop under `parent`.
    ///
    /// The returned handle is the only way to observe and control the job.
    /// The job is registered by the time this returns, so events published
    /// afterwards (including `GlobalStartup`) reach it.
    pub async fn run(self, parent: &CancellationToken) -> JobHandle {
        let handle = self.handle();
        self.handler.subscribe().await;
        let parent = parent.clone();
        tokio::spawn(self.run_loop(parent));
        handle
    }

    async fn run_loop(mut self, parent: CancellationToken) {
        let ctx = parent.child_token();

        if let Some(period) = self.interval {
            new_timer(ctx.clone(), self.handler.sender(), period, self.sources.run_every.source.clone());
        }
        if let Some(period) = self.heartbeat {
            new_timer(ctx.clone(), self.handler.sender(), period, self.sources.heartbeat.source.clone());
        }
        if let Some(timeout) = self.start_timeout {
            new_timeout(ctx.clone(), self.handler.sender(), timeout, self.sources.start_timeout.source.clone());
            self.start_timeout_armed = true;
        }
        debug!(job = %self.name, "run loop started");

        loop {
            let ev = tokio::select! {
                _ = ctx.cancelled() => break,
                ev = self.rx.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };
            if self.process(&ctx, ev).await == Flow::Halt {
                break;
            }
        }

        self.cleanup(&parent, ctx).await;
    }

    fn classify(&self, ev: &Event) -> Input {
        let s = &self.sources;
        if *ev == s.heartbeat {
            Input::Heartbeat
        } else if self.start_timeout_armed && *ev == s.start_timeout {
            Input::StartTimeout
        } else if *ev == s.run_every {
            Input::RunEvery
        } else if *ev == s.quit || *ev == Event::quit_by_close() {
            Input::Quit
        } else if *ev == Event::global_shutdown() {
            Input::Shutdown
        } else if *ev == Event::global_enter_maintenance() {
            Input::EnterMaintenance
        } else if *ev == Event::global_exit_maintenance() {
            Input::ExitMaintenance
        } else if *ev == s.exit_success || *ev == s.exit_failed {
            Input::Exited
        } else if *ev == s.healthy {
            Input::Healthy
        } else if *ev == s.unhealthy {
            Input::Unhealthy
        } else if self.start_event.as_ref() == Some(ev) {
            Input::Start
        } else {
            Input::Ignore
        }
    }

    async fn process(&mut self, ctx: &CancellationToken, ev: Event) -> Flow {
        match self.classify(&ev) {
            Input::Heartbeat => {
                if let Some(service) = &self.service {
                    if self.shared.status.read().await.is_healthy() {
                        service.heartbeat().await;
                    }
                }
                Flow::Continue
            }
            Input::StartTimeout => {
                self.start_timeout_armed = false;
                warn!(job = %self.name, "timed out waiting for start trigger");
                self.bus.publish(self.sources.timer_expired.clone()).await;
                if self.handler.try_enqueue(self.sources.quit.clone()) {
                    Flow::Continue
                } else {
                    Flow::Halt
                }
            }
            Input::RunEvery => {
                if self.exec.as_ref().is_some_and(|e| e.is_busy()) {
                    debug!(job = %self.name, "previous run still in flight, skipping interval");
                    return Flow::Continue;
                }
                if !self.restarts.consume() {
                    debug!(job = %self.name, "interval expired but restart not permitted");
                    self.start_event = None;
                    return Flow::Halt;
                }
                self.start_exec(ctx).await;
                Flow::Continue
            }
            Input::Quit => {
                self.restarts.exhaust();
                self.starts_remain = Some(0);
                self.start_event = None;
                Flow::Halt
            }
            Input::Shutdown => self.on_shutdown(),
            Input::EnterMaintenance => {
                self.shared.set_status(JobStatus::Maintenance).await;
                if let Some(service) = &self.service {
                    service.mark_for_maintenance().await;
                }
                if self.start_event.as_ref() == Some(&ev) {
                    return self.on_start(ctx).await;
                }
                Flow::Continue
            }
            Input::ExitMaintenance => {
                self.shared.set_status(JobStatus::Unknown).await;
                if self.start_event.as_ref() == Some(&ev) {
                    return self.on_start(ctx).await;
                }
                Flow::Continue
            }
            Input::Exited => self.on_exit(ctx).await,
            Input::Healthy => {
                if *self.shared.status.read().await != JobStatus::Maintenance {
                    self.shared.set_status(JobStatus::Healthy).await;
                    if let Some(service) = &self.service {
                        service.heartbeat().await;
                    }
                }
                Flow::Continue
            }
            Input::Unhealthy => {
                if *self.shared.status.read().await != JobStatus::Maintenance {
                    self.shared.set_status(JobStatus::Unhealthy).await;
                }
                Flow::Continue
            }
            Input::Start => self.on_start(ctx).await,
            Input::Ignore => Flow::Continue,
        }
    }

    fn on_shutdown(&mut self) -> Flow {
        self.restarts.exhaust();
        if self.stop_triggered && self.exec.is_some() {
            // runs on its parent's stop (or is already running), then halts on its own exit
            if self.starts_remain.is_none() {
                self.starts_remain = Some(1);
            }
            return Flow::Continue;
        }
        self.starts_remain = Some(0);
        self.start_event = None;
        Flow::Halt
    }

    async fn on_exit(&mut self, ctx: &CancellationToken) -> Flow {
        if self.interval.is_some() {
            return Flow::Continue;
        }
        if self.restarts.consume() {
            debug!(job = %self.name, remaining = ?self.restarts.remaining(), "restarting");
            self.start_exec(ctx).await;
            return Flow::Continue;
        }
        if self.starts_remain != Some(0) {
            return Flow::Continue;
        }
        debug!(job = %self.name, "exited and restart not permitted");
        self.start_event = None;
        self.shared.set_status(JobStatus::Unknown).await;
        Flow::Halt
    }

    async fn on_start(&mut self, ctx: &CancellationToken) -> Flow {
        match self.starts_remain {
            Some(0) => {
                self.start_event = None;
                return Flow::Halt;
            }
            Some(n) => {
                let left = n - 1;
                self.starts_remain = Some(left);
                if left == 0 || self.restarts.remaining() == Some(0) {
                    // a second trigger while the command runs must not start it again
                    self.start_event = None;
                }
            }
            None => {}
        }
        self.start_exec(ctx).await;
        Flow::Continue
    }

    async fn start_exec(&mut self, ctx: &CancellationToken) {
        self.start_timeout_armed = false;
        self.shared.set_status(JobStatus::Unknown).await;
        if let Some(exec) = &self.exec {
            info!(job = %self.name, "starting");
            exec.run(ctx, &self.bus);
        }
    }

    async fn cleanup(mut self, parent: &CancellationToken, ctx: CancellationToken) {
        self.bus.publish(self.sources.stopping.clone()).await;

        if let Some(wait_for) = self.stopping_wait.clone() {
            let waiter = CancellationToken::new();
            if let Some(timeout) = self.stopping_timeout {
                new_timeout(
                    waiter.clone(),
                    self.handler.sender(),
                    timeout,
                    self.sources.stopping_timeout.source.clone(),
                );
            }
            debug!(job = %self.name, waiting = %wait_for, "waiting for dependent to stop");
            loop {
                let ev = tokio::select! {
                    _ = parent.cancelled() => break,
                    ev = self.rx.recv() => ev,
                };
                match ev {
                    Some(ev) if ev == wait_for => break,
                    Some(ev) if ev == self.sources.stopping_timeout => {
                        warn!(job = %self.name, "stopping timeout elapsed before {wait_for}");
                        break;
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
            waiter.cancel();
        }

        ctx.cancel();
        self.handler.unsubscribe().await;
        if let Some(service) = &self.service {
            service.deregister().await;
        }
        if let Some(exec) = &self.exec {
            exec.close_logs();
        }
        self.rx.close();
        self.shared.complete.store(true, Ordering::SeqCst);
        info!(job = %self.name, "stopped");
        self.bus.publish(self.sources.stopped.clone()).await;
        self.handler.flush();
    }
}

/// Read-only view and control surface of a job.
#[derive(Clone)]
pub struct JobHandle {
    name: Arc<str>,
    shared: Arc<Shared>,
    service: Option<Advertisement>,
    exec: Option<Arc<Command>>,
    handler: Arc<EventHandler>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("name", &self.name)
            .field("complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}

impl JobHandle {
    /// Job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status.
    pub async fn status(&self) -> JobStatus {
        *self.shared.status.read().await
    }

    /// Advertised service definition, if any.
    pub fn service(&self) -> Option<&ServiceDefinition> {
        self.service.as_ref().map(Advertisement::definition)
    }

    /// True once the stopping sequence has finished.
    pub fn is_complete(&self) -> bool {
        self.shared.complete.load(Ordering::SeqCst)
    }

    /// True while the job's command is running.
    pub fn is_running(&self) -> bool {
        self.exec.as_ref().is_some_and(|e| e.is_running())
    }

    /// Stops the job and waits until `Stopped{self}` has been published.
    pub async fn quit(&self) {
        self.handler.quit().await;
    }

    /// SIGKILLs the job's running command, if any.
    pub fn kill(&self) {
        if let Some(exec) = &self.exec {
            exec.kill();
        }
    }

    /// Resolves once the job's command is not running.
    pub async fn wait_idle(&self) {
        if let Some(exec) = &self.exec {
            exec.wait_idle().await;
        }
    }
}
