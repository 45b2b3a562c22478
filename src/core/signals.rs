//! # OS signal handling.
//!
//! [`listen`] maps process signals onto supervisor controls until its token
//! is cancelled.
//!
//! **Unix platforms:**
//! - `SIGTERM`, `SIGINT` → terminate
//! - `SIGHUP` → reload
//! - `SIGUSR1` → toggle maintenance
//!
//! **Windows platforms:**
//! - `Ctrl-C` → terminate

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::supervisor::Control;

/// Forwards signals to `control` until `ctx` is cancelled.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub(super) async fn listen(control: Control, ctx: CancellationToken) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            _ = sigterm.recv() => {
                info!(signal = "SIGTERM", "terminating");
                control.terminate().await;
            }
            _ = sigint.recv() => {
                info!(signal = "SIGINT", "terminating");
                control.terminate().await;
            }
            _ = sighup.recv() => {
                info!(signal = "SIGHUP", "reloading");
                control.reload().await;
            }
            _ = sigusr1.recv() => {
                info!(signal = "SIGUSR1", "toggling maintenance");
                control.toggle_maintenance().await;
            }
        }
    }
}

/// Forwards Ctrl-C to `control` until `ctx` is cancelled.
#[cfg(not(unix))]
pub(super) async fn listen(control: Control, ctx: CancellationToken) -> std::io::Result<()> {
    loop {
        tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            res = tokio::signal::ctrl_c() => {
                res?;
                info!(signal = "ctrl-c", "terminating");
                control.terminate().await;
            }
        }
    }
}
