//! # Supervisor: loads a workload, runs it on the bus and drives shutdown and reload.
//!
//! ```text
//! run(loader):
//!   loop {
//!     ├─► workload = loader.load() ; validate ; link stop dependencies
//!     ├─► build every Job / Watch / HealthCheck   (config errors abort here)
//!     ├─► start each one                          (subscribe before any event flows)
//!     ├─► publish GlobalStartup
//!     ├─► spawn signal listener                   (SIGTERM/SIGINT, SIGHUP, SIGUSR1)
//!     ├─► reload = bus.wait()                     (every counted subscriber gone)
//!     ├─► cancel generation token
//!     ├─► wait up to stop_timeout for running commands
//!     │       └─ stragglers ──► SIGKILL, GraceExceeded{stuck}
//!     └─► reload ? clear flag, continue : return
//!   }
//! ```
//!
//! ## Controls
//! - [`Supervisor::terminate`] publishes `GlobalShutdown`.
//! - [`Supervisor::reload`] sets the bus reload flag, then publishes `GlobalShutdown`.
//! - [`Supervisor::toggle_maintenance`] publishes `EnterMaintenance`/`ExitMaintenance`.
//!
//! The bus outlives generations, so subscribers registered on [`Supervisor::bus`]
//! keep observing across reloads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SupervisorConfig;
use super::signals;
use super::workload::{Loader, Workload};
use crate::checks::HealthCheck;
use crate::error::RuntimeError;
use crate::events::{Event, EventBus};
use crate::jobs::{link_stop_dependencies, Job, JobHandle};
use crate::watches::Watch;

/// Operations shared by the public API and the signal listener.
#[derive(Clone)]
pub(super) struct Control {
    bus: EventBus,
    maintenance: Arc<AtomicBool>,
    lock: Arc<Mutex<()>>,
}

impl Control {
    pub(super) async fn terminate(&self) {
        let _guard = self.lock.lock().await;
        self.bus.shutdown().await;
    }

    pub(super) async fn reload(&self) {
        let _guard = self.lock.lock().await;
        self.bus.set_reload_flag();
        self.bus.shutdown().await;
    }

    pub(super) async fn toggle_maintenance(&self) {
        let _guard = self.lock.lock().await;
        let was = self.maintenance.fetch_xor(true, Ordering::SeqCst);
        let ev = if was {
            Event::global_exit_maintenance()
        } else {
            Event::global_enter_maintenance()
        };
        self.bus.publish(ev).await;
    }
}

/// Runs workloads produced by a [`Loader`] until terminated.
pub struct Supervisor {
    cfg: SupervisorConfig,
    control: Control,
    jobs: RwLock<Vec<JobHandle>>,
}

impl Supervisor {
    /// Creates a supervisor with its own bus.
    pub fn new(cfg: SupervisorConfig) -> Self {
        let bus = EventBus::with_history(cfg.history);
        Self {
            cfg,
            control: Control {
                bus,
                maintenance: Arc::new(AtomicBool::new(false)),
                lock: Arc::new(Mutex::new(())),
            },
            jobs: RwLock::new(Vec::new()),
        }
    }

    /// The shared event bus.
    pub fn bus(&self) -> &EventBus {
        &self.control.bus
    }

    /// Handles for the jobs of the current generation.
    pub async fn jobs(&self) -> Vec<JobHandle> {
        self.jobs.read().await.clone()
    }

    /// True while global maintenance is on.
    pub fn in_maintenance(&self) -> bool {
        self.control.maintenance.load(Ordering::SeqCst)
    }

    /// Asks every entity to stop; `run` returns once they have.
    pub async fn terminate(&self) {
        self.control.terminate().await;
    }

    /// Stops every entity, then rebuilds from the loader.
    pub async fn reload(&self) {
        self.control.reload().await;
    }

    /// Flips global maintenance mode.
    pub async fn toggle_maintenance(&self) {
        self.control.toggle_maintenance().await;
    }

    /// Runs generations until one ends without a reload request.
    pub async fn run<L: Loader>(&self, loader: L) -> Result<(), RuntimeError> {
        loop {
            let mut workload = loader.load()?;
            workload.validate()?;
            link_stop_dependencies(&mut workload.jobs);

            let token = CancellationToken::new();
            let jobs = self.start(workload, &token).await?;
            *self.jobs.write().await = jobs.clone();

            self.bus().publish(Event::global_startup()).await;
            if self.cfg.handle_signals {
                self.spawn_signal_listener(&token);
            }

            let reload = self.bus().wait().await;
            token.cancel();
            let drained = self.drain_commands(&jobs).await;

            if !reload {
                info!("all jobs stopped");
                return drained;
            }
            if let Err(err) = drained {
                warn!(error = %err, label = err.as_label(), "commands killed during reload");
            }
            self.bus().clear_reload_flag();
            info!("reloading");
        }
    }

    /// Builds every entity first, so a bad config leaves nothing running.
    async fn start(
        &self,
        workload: Workload,
        token: &CancellationToken,
    ) -> Result<Vec<JobHandle>, RuntimeError> {
        let bus = self.bus();
        let capacity = self.cfg.queue_capacity_clamped();

        let jobs = workload
            .jobs
            .iter()
            .map(|cfg| Job::new(cfg, bus, capacity))
            .collect::<Result<Vec<_>, _>>()?;
        let mut watches = Vec::with_capacity(workload.watches.len());
        if let Some(backend) = &workload.discovery {
            for cfg in &workload.watches {
                watches.push(Watch::new(cfg, backend.clone(), bus, capacity)?);
            }
        }
        let checks = workload
            .checks
            .iter()
            .map(|cfg| HealthCheck::new(cfg, bus, capacity))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            jobs = jobs.len(),
            watches = watches.len(),
            checks = checks.len(),
            "starting workload"
        );

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            handles.push(job.run(token).await);
        }
        for watch in watches {
            watch.run(token).await;
        }
        for check in checks {
            check.run(token).await;
        }
        Ok(handles)
    }

    fn spawn_signal_listener(&self, token: &CancellationToken) {
        let control = self.control.clone();
        let ctx = token.clone();
        tokio::spawn(async move {
            if let Err(err) = signals::listen(control, ctx).await {
                warn!(error = %err, "signal listener failed to start");
            }
        });
    }

    /// Waits up to `stop_timeout` for running commands, then kills what is left.
    async fn drain_commands(&self, jobs: &[JobHandle]) -> Result<(), RuntimeError> {
        let grace = self.cfg.stop_timeout;
        let idle = join_all(jobs.iter().map(|job| job.wait_idle()));
        if tokio::time::timeout(grace, idle).await.is_ok() {
            debug!("all commands idle");
            return Ok(());
        }

        let stuck: Vec<String> = jobs
            .iter()
            .filter(|job| job.is_running())
            .map(|job| {
                info!(job = job.name(), "killing processes");
                job.kill();
                job.name().to_string()
            })
            .collect();
        if stuck.is_empty() {
            return Ok(());
        }
        warn!(?stuck, ?grace, "stop timeout exceeded");
        Err(RuntimeError::GraceExceeded { grace, stuck })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::events::EventCode;
    use crate::jobs::JobConfig;
    use crate::subscribers::Recorder;
    use crate::watches::WatchConfig;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    fn config() -> SupervisorConfig {
        SupervisorConfig::default().with_signals(false)
    }

    async fn observed(sup: &Supervisor) -> Arc<Recorder> {
        let rec = Recorder::new("rec");
        sup.bus().register_internal(rec.clone()).await;
        rec
    }

    #[tokio::test]
    async fn test_run_returns_when_jobs_finish() {
        let sup = Supervisor::new(config());
        let rec = observed(&sup).await;
        let wl = Workload::new().with_job(JobConfig::new("app").with_exec("true"));

        let res = tokio::time::timeout(WAIT, sup.run(wl)).await.unwrap();
        assert!(res.is_ok());
        assert_eq!(rec.count(&Event::new(EventCode::ExitSuccess, "app")), 1);
        assert_eq!(rec.count(&Event::new(EventCode::Stopped, "app")), 1);
        assert!(sup.jobs().await[0].is_complete());
    }

    #[tokio::test]
    async fn test_terminate_stops_long_running_job() {
        let sup = Arc::new(Supervisor::new(config()));
        let rec = observed(&sup).await;
        let wl = Workload::new().with_job(JobConfig::new("app").with_exec("sleep 30"));

        let runner = tokio::spawn({
            let sup = sup.clone();
            async move { sup.run(wl).await }
        });
        assert!(rec.wait_for(&Event::global_startup(), WAIT).await);
        sup.terminate().await;

        let res = tokio::time::timeout(WAIT, runner).await.unwrap().unwrap();
        assert!(res.is_ok());
        assert_eq!(rec.count(&Event::new(EventCode::Stopped, "app")), 1);
        assert!(!sup.jobs().await[0].is_running());
    }

    #[tokio::test]
    async fn test_reload_rebuilds_from_loader() {
        let sup = Arc::new(Supervisor::new(config()));
        let rec = observed(&sup).await;
        let loads = Arc::new(AtomicUsize::new(0));

        let loader = {
            let loads = loads.clone();
            move || {
                let exec = match loads.fetch_add(1, Ordering::SeqCst) {
                    0 => "sleep 30",
                    _ => "true",
                };
                Ok::<_, ConfigError>(Workload::new().with_job(JobConfig::new("app").with_exec(exec)))
            }
        };
        let runner = tokio::spawn({
            let sup = sup.clone();
            async move { sup.run(loader).await }
        });

        assert!(rec.wait_for(&Event::global_startup(), WAIT).await);
        sup.reload().await;

        let res = tokio::time::timeout(WAIT, runner).await.unwrap().unwrap();
        assert!(res.is_ok());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(rec.count(&Event::global_startup()), 2);
        assert_eq!(rec.count(&Event::new(EventCode::ExitSuccess, "app")), 1);
        assert!(!sup.bus().reload_requested());
    }

    #[tokio::test]
    async fn test_toggle_maintenance_alternates() {
        let sup = Supervisor::new(config());
        let rec = observed(&sup).await;

        sup.toggle_maintenance().await;
        assert!(sup.in_maintenance());
        sup.toggle_maintenance().await;
        assert!(!sup.in_maintenance());

        let enter = rec.position(&Event::global_enter_maintenance());
        let exit = rec.position(&Event::global_exit_maintenance());
        assert!(enter.is_some() && enter < exit);
    }

    #[tokio::test]
    async fn test_invalid_workload_starts_nothing() {
        let sup = Supervisor::new(config());
        let wl = Workload::new()
            .with_job(JobConfig::new("app").with_exec("true"))
            .with_watch(WatchConfig::new("db", Duration::from_secs(1)));

        let res = sup.run(wl).await;
        assert!(matches!(
            res,
            Err(RuntimeError::Config(ConfigError::MissingDiscovery { .. }))
        ));
        assert_eq!(sup.bus().subscriber_count(), 0);
    }
}
