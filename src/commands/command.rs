//! # Run one external command.
//!
//! [`Command`] spawns a child process in its own process group, streams its
//! output into `tracing`, and reports the outcome on the bus.
//!
//! ## Event flow
//!
//! ```text
//! Success:
//!   spawn → wait → exit 0       → publish ExitSuccess{name}
//!
//! Failure:
//!   spawn → wait → exit N != 0  → publish ExitFailed{name}, Error{"name: exit status N"}
//!
//! Spawn error:
//!   spawn fails                 → publish ExitFailed{name}, Error{message}
//!
//! Timeout:
//!   timeout elapsed → SIGKILL group → publish ExitFailed{name}, Error{message}
//!
//! Cancellation:
//!   ctx cancelled   → SIGTERM group → wait → publish by exit status
//!
//! Queued behind a run, ctx cancelled meanwhile:
//!   lock acquired   → nothing spawned, nothing published → Err(Cancelled)
//! ```
//!
//! ## Rules
//! - Runs of one command are serialised: a second `run` waits for the first to finish.
//! - A queued run whose token was cancelled while it waited never spawns.
//! - Periodic callers check [`Command::is_busy`] and skip the tick instead of queueing.
//! - `run` returns at once; the outcome arrives later as an event (and via the join handle).
//! - Zombies left in the process group are reaped after every run.
//! - Output is forwarded line by line, never buffered whole.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::args::{parse_args, split_argv};
use super::reaper::reap_children;
use crate::error::{CommandError, ConfigError};
use crate::events::{Event, EventBus, EventCode};

/// An executable plus arguments, runnable any number of times.
#[derive(Debug)]
pub struct Command {
    name: Arc<str>,
    exec: String,
    args: Vec<String>,
    timeout: Option<Duration>,
    uid: Option<u32>,
    gid: Option<u32>,
    pid: AtomicI32,
    in_flight: AtomicUsize,
    lock: Arc<Mutex<()>>,
    logs: CancellationToken,
}

enum Ended {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(Duration),
    Cancelled,
}

impl Command {
    /// Parses a whitespace-separated command line.
    pub fn parse(
        name: impl Into<Arc<str>>,
        raw: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let (exec, args) = parse_args(&name, raw)?;
        Ok(Self::build(name, exec, args, timeout))
    }

    /// Builds a command from an argument vector.
    pub fn new(
        name: impl Into<Arc<str>>,
        argv: Vec<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let (exec, args) = split_argv(&name, argv)?;
        Ok(Self::build(name, exec, args, timeout))
    }

    fn build(name: Arc<str>, exec: String, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            name,
            exec,
            args,
            timeout: timeout.filter(|d| !d.is_zero()),
            uid: None,
            gid: None,
            pid: AtomicI32::new(0),
            in_flight: AtomicUsize::new(0),
            lock: Arc::new(Mutex::new(())),
            logs: CancellationToken::new(),
        }
    }

    /// Runs the child as this user and group (honoured only when running as root).
    pub fn with_user(mut self, uid: Option<u32>, gid: Option<u32>) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Renames the command; events are published under this name.
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Name used as the event source and in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The executable.
    pub fn exec(&self) -> &str {
        &self.exec
    }

    /// Arguments after the executable.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Per-run timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// PID of the running child, if one is running.
    pub fn pid(&self) -> Option<i32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// True while a child process is alive.
    pub fn is_running(&self) -> bool {
        self.pid().is_some()
    }

    /// True from `run` until that run has published its outcome,
    /// including runs still queued behind another.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Starts a run in the background.
    ///
    /// The outcome is published on `bus` and also returned through the handle:
    /// `Ok(exit_code)` for any normal exit, `Err` when the process could not
    /// be started or waited on, was killed by the timeout, or was cancelled
    /// while queued behind another run.
    pub fn run(
        self: &Arc<Self>,
        ctx: &CancellationToken,
        bus: &EventBus,
    ) -> JoinHandle<Result<i32, CommandError>> {
        let cmd = Arc::clone(self);
        let ctx = ctx.clone();
        let bus = bus.clone();
        cmd.in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let _in_flight = InFlight(&cmd.in_flight);
            cmd.execute(ctx, bus).await
        })
    }

    async fn execute(&self, ctx: CancellationToken, bus: EventBus) -> Result<i32, CommandError> {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        if ctx.is_cancelled() {
            debug!(job = %self.name, "cancelled while queued, not starting");
            return Err(CommandError::Cancelled {
                name: self.name.to_string(),
            });
        }
        debug!(job = %self.name, exec = %self.exec, "run start");

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(source) => {
                drop(guard);
                error!(job = %self.name, error = %source, "unable to start");
                let err = CommandError::Spawn {
                    name: self.name.to_string(),
                    source,
                };
                self.publish_failure(&bus, err.to_string()).await;
                return Err(err);
            }
        };

        let pid = child.id().and_then(|p| i32::try_from(p).ok()).unwrap_or(0);
        self.pid.store(pid, Ordering::SeqCst);

        if let Some(out) = child.stdout.take() {
            tokio::spawn(forward_lines(out, self.name.clone(), "stdout", self.logs.clone()));
        }
        if let Some(err) = child.stderr.take() {
            tokio::spawn(forward_lines(err, self.name.clone(), "stderr", self.logs.clone()));
        }

        let ended = tokio::select! {
            res = child.wait() => Ended::Exited(res),
            d = expire(self.timeout) => Ended::TimedOut(d),
            _ = ctx.cancelled() => Ended::Cancelled,
        };

        let result = match ended {
            Ended::Exited(res) => res.map(exit_code),
            Ended::TimedOut(timeout) => {
                warn!(job = %self.name, ?timeout, args = ?self.args, "timeout, killing process group");
                signal_group(&self.name, pid, Signal::SIGKILL);
                let _ = child.wait().await;
                self.pid.store(0, Ordering::SeqCst);
                reap_children(pid);
                drop(guard);
                let err = CommandError::Timeout {
                    name: self.name.to_string(),
                    timeout,
                };
                self.publish_failure(&bus, err.to_string()).await;
                return Err(err);
            }
            Ended::Cancelled => {
                signal_group(&self.name, pid, Signal::SIGTERM);
                child.wait().await.map(exit_code)
            }
        };

        self.pid.store(0, Ordering::SeqCst);
        reap_children(pid);
        drop(guard);
        debug!(job = %self.name, "run end");

        match result {
            Ok(0) => {
                debug!(job = %self.name, "exited without error");
                bus.publish(Event::new(EventCode::ExitSuccess, self.name.clone())).await;
                Ok(0)
            }
            Ok(code) => {
                error!(job = %self.name, code, "exited with error");
                self.publish_failure(&bus, format!("{}: exit status {}", self.name, code))
                    .await;
                Ok(code)
            }
            Err(source) => {
                let err = CommandError::Wait {
                    name: self.name.to_string(),
                    source,
                };
                error!(job = %self.name, error = %err, "wait failed");
                self.publish_failure(&bus, err.to_string()).await;
                Err(err)
            }
        }
    }

    fn spawn(&self) -> std::io::Result<tokio::process::Child> {
        let mut cmd = tokio::process::Command::new(&self.exec);
        cmd.args(&self.args).stdin(Stdio::null()).process_group(0);

        if self.logs.is_cancelled() {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        if nix::unistd::getuid().is_root() {
            if let Some(uid) = self.uid {
                cmd.uid(uid);
            }
            if let Some(gid) = self.gid {
                cmd.gid(gid);
            }
        } else if self.uid.is_some() || self.gid.is_some() {
            debug!(job = %self.name, "skipping uid/gid, not running as root");
        }
        cmd.spawn()
    }

    async fn publish_failure(&self, bus: &EventBus, message: String) {
        bus.publish(Event::new(EventCode::ExitFailed, self.name.clone())).await;
        bus.publish(Event::new(EventCode::Error, message)).await;
    }

    /// Sends SIGTERM to the running child's process group.
    pub fn term(&self) {
        if let Some(pid) = self.pid() {
            signal_group(&self.name, pid, Signal::SIGTERM);
        }
    }

    /// Sends SIGKILL to the running child's process group.
    pub fn kill(&self) {
        if let Some(pid) = self.pid() {
            signal_group(&self.name, pid, Signal::SIGKILL);
        }
    }

    /// Resolves once no run of this command is in flight.
    pub async fn wait_idle(&self) {
        let _idle = self.lock.lock().await;
    }

    /// Stops forwarding output; later runs inherit the supervisor's stdio.
    pub fn close_logs(&self) {
        self.logs.cancel();
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn expire(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(d) => {
            time::sleep(d).await;
            d
        }
        None => std::future::pending().await,
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => -1,
    }
}

fn signal_group(name: &str, pgid: i32, sig: Signal) {
    if pgid <= 0 {
        return;
    }
    debug!(job = %name, pgid, signal = sig.as_str(), "signalling process group");
    if let Err(errno) = killpg(Pid::from_raw(pgid), sig) {
        debug!(job = %name, pgid, %errno, "signal not delivered");
    }
}

async fn forward_lines<R>(reader: R, job: Arc<str>, stream: &'static str, stop: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => info!(target: "jobvisor::commands", job = %job, stream, "{line}"),
                Ok(None) => break,
                Err(err) => {
                    debug!(target: "jobvisor::commands", job = %job, stream, %err, "log stream closed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscribers::Recorder;

    async fn bus_with_recorder() -> (EventBus, Arc<Recorder>) {
        let bus = EventBus::new();
        let rec = Recorder::new("rec");
        bus.register_internal(rec.clone()).await;
        (bus, rec)
    }

    #[tokio::test]
    async fn test_success_publishes_exit_success() {
        let (bus, rec) = bus_with_recorder().await;
        let cmd = Arc::new(Command::parse("ok", "true", None).unwrap());
        let code = cmd.run(&CancellationToken::new(), &bus).await.unwrap().unwrap();
        assert_eq!(code, 0);
        assert_eq!(rec.count(&Event::new(EventCode::ExitSuccess, "ok")), 1);
        assert!(!cmd.is_running());
    }

    #[tokio::test]
    async fn test_failure_publishes_exit_failed_and_error() {
        let (bus, rec) = bus_with_recorder().await;
        let cmd = Arc::new(Command::parse("bad", "false", None).unwrap());
        let code = cmd.run(&CancellationToken::new(), &bus).await.unwrap().unwrap();
        assert_eq!(code, 1);
        let events = rec.events();
        assert_eq!(events[0], Event::new(EventCode::ExitFailed, "bad"));
        assert_eq!(events[1], Event::new(EventCode::Error, "bad: exit status 1"));
    }

    #[tokio::test]
    async fn test_spawn_error() {
        let (bus, rec) = bus_with_recorder().await;
        let cmd = Arc::new(Command::parse("ghost", "/nonexistent/jobvisor-test-bin", None).unwrap());
        let err = cmd.run(&CancellationToken::new(), &bus).await.unwrap().unwrap_err();
        assert_eq!(err.as_label(), "command_spawn");
        assert_eq!(rec.count(&Event::new(EventCode::ExitFailed, "ghost")), 1);
    }

    #[tokio::test]
    async fn test_timeout_kills_group() {
        let (bus, rec) = bus_with_recorder().await;
        let cmd = Arc::new(Command::parse("slow", "sleep 5", Some(Duration::from_millis(100))).unwrap());
        let started = std::time::Instant::now();
        let err = cmd.run(&CancellationToken::new(), &bus).await.unwrap().unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(rec.count(&Event::new(EventCode::ExitFailed, "slow")), 1);
    }

    #[tokio::test]
    async fn test_cancel_terminates_child() {
        let (bus, rec) = bus_with_recorder().await;
        let ctx = CancellationToken::new();
        let cmd = Arc::new(Command::parse("svc", "sleep 5", None).unwrap());
        let handle = cmd.run(&ctx, &bus);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cmd.is_running());
        ctx.cancel();

        let code = handle.await.unwrap().unwrap();
        assert_eq!(code, 128 + Signal::SIGTERM as i32);
        assert_eq!(rec.count(&Event::new(EventCode::ExitFailed, "svc")), 1);
        cmd.wait_idle().await;
    }

    #[tokio::test]
    async fn test_runs_are_serialised() {
        let (bus, rec) = bus_with_recorder().await;
        let cmd = Arc::new(Command::parse("seq", "sleep 0.1", None).unwrap());
        let ctx = CancellationToken::new();
        let first = cmd.run(&ctx, &bus);
        let second = cmd.run(&ctx, &bus);
        let started = std::time::Instant::now();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(190));
        assert_eq!(rec.count(&Event::new(EventCode::ExitSuccess, "seq")), 2);
    }

    #[tokio::test]
    async fn test_queued_run_skipped_after_cancel() {
        let (bus, rec) = bus_with_recorder().await;
        let ctx = CancellationToken::new();
        let cmd = Arc::new(Command::parse("tick", "sleep 5", None).unwrap());
        let first = cmd.run(&ctx, &bus);
        let queued = cmd.run(&ctx, &bus);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cmd.is_busy());
        ctx.cancel();

        assert_eq!(first.await.unwrap().unwrap(), 128 + Signal::SIGTERM as i32);
        let err = queued.await.unwrap().unwrap_err();
        assert_eq!(err.as_label(), "command_cancelled");
        assert_eq!(rec.count(&Event::new(EventCode::ExitFailed, "tick")), 1);
        assert!(!cmd.is_busy());
    }
}
