//! # jobvisor
//!
//! **Jobvisor** is an event-driven process supervisor for container init.
//!
//! It runs a set of *jobs* (commands with restart, timer and health
//! semantics), *watches* (pollers of a service-discovery backend) and
//! *health checks*, all coordinated over a single typed event bus. Nothing
//! calls anything else directly: a job starts because some event arrived,
//! and every outcome of its command becomes another event.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  JobConfig   │   │ WatchConfig  │   │ CheckConfig  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            └──────────────────┼──────────────────┘
//!                               ▼
//!                          Workload ◄──── Loader (startup + every reload)
//!                               ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - builds Job / Watch / HealthCheck, subscribes each to the bus   │
//! │  - publishes GlobalStartup, maps OS signals to controls           │
//! │  - waits for the bus to drain, then reloads or exits              │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────┐       ┌──────────┐       ┌──────────────┐
//!     │   Job    │       │  Watch   │       │ HealthCheck  │
//!     │(run loop)│       │(run loop)│       │  (run loop)  │
//!     └┬────▲────┘       └┬────▲────┘       └┬────▲───────┘
//!      │    │ mpsc queue  │    │             │    │
//!      │    │ (bounded)   │    │             │    │
//!      ▼    │             ▼    │             ▼    │
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventBus: publish = fan-out to every subscriber queue            │
//! │  (awaits on full queues, never drops)                             │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Job lifecycle
//! ```text
//! {start trigger} ──► run command ──► ExitSuccess / ExitFailed{job}
//!                                          │
//!                     restarts left? ──────┼──► yes: run again
//!                                          └──► no:  Stopping{job}
//!                                                     ├─ stopping wait (optional)
//!                                                     ├─ deregister, unsubscribe
//!                                                     └─ Stopped{job}
//! ```
//!
//! Jobs chain through these events: a `preStart` job is a job the main job
//! waits on with `ExitSuccess{app.preStart}`; `preStop`/`postStop` start on
//! `Stopping{app}`/`Stopped{app}`.
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Events**        | Typed event codes, bus with drain and reload signalling      | [`Event`], [`EventCode`], [`EventBus`]      |
//! | **Subscribers**   | Hook into every published event                              | [`Subscriber`], [`EventHandler`], [`Recorder`] |
//! | **Jobs**          | Commands driven by events, timers and restart budgets        | [`JobConfig`], [`Job`], [`JobHandle`]       |
//! | **Discovery**     | Heartbeats, maintenance and upstream change detection        | [`Discovery`], [`Advertisement`]            |
//! | **Supervision**   | Load, run, reload and terminate a workload                   | [`Supervisor`], [`Workload`], [`Loader`]    |
//! | **Errors**        | Typed errors for configuration, commands and the runtime     | [`ConfigError`], [`RuntimeError`]           |
//! | **Logging**       | `tracing` subscriber setup in text or JSON                   | [`LogConfig`]                               |
//!
//! ## Example
//! ```rust
//! use jobvisor::{JobConfig, Supervisor, SupervisorConfig, Workload};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut app = JobConfig::new("app").with_exec("echo serving");
//!     let setup = JobConfig::pre_start(&mut app, "echo migrating");
//!
//!     let workload = Workload::new().with_job(setup).with_job(app);
//!
//!     let sup = Supervisor::new(SupervisorConfig::default().with_signals(false));
//!     sup.run(workload).await?;
//!     Ok(())
//! }
//! ```

mod checks;
mod commands;
mod core;
mod discovery;
mod error;
mod events;
mod jobs;
mod logging;
mod policies;
mod subscribers;
mod watches;

// ---- Public re-exports ----

pub use checks::{HealthCheck, HealthCheckConfig};
pub use commands::{parse_args, reap_children, Command};
pub use crate::core::{Loader, Supervisor, SupervisorConfig, Workload};
pub use discovery::{Advertisement, Discovery, ServiceDefinition};
pub use error::{CommandError, ConfigError, DiscoveryError, RuntimeError};
pub use events::{
    new_timeout, new_timer, Event, EventBus, EventCode, WeakEventBus, CLOSED, DEFAULT_HISTORY,
    GLOBAL, MIN_PERIOD,
};
pub use jobs::{link_stop_dependencies, Job, JobConfig, JobHandle, JobStatus, Starts, When};
pub use logging::{LogConfig, LogFormat};
pub use policies::{ParseRestartPolicyError, RestartBudget, RestartPolicy};
pub use subscribers::{EventHandler, Recorder, Subscriber, SubscriberId, DEFAULT_QUEUE_CAPACITY};
pub use watches::{Watch, WatchConfig};
