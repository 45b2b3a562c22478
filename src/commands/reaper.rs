//! Zombie reaping for a command's process group.
//!
//! Every command runs in its own process group, so waiting on `-pgid`
//! collects orphaned descendants of that command only.

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::trace;

/// Reaps every already-exited process in group `pgid` without blocking.
///
/// Returns the number of processes collected.
pub fn reap_children(pgid: i32) -> usize {
    if pgid <= 0 {
        return 0;
    }
    let mut reaped = 0;
    loop {
        match waitpid(Some(Pid::from_raw(-pgid)), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => {
                trace!(pgid, ?status, "reaped");
                reaped += 1;
            }
            Err(Errno::EINTR) => continue,
            // ECHILD: nothing left in the group
            Err(_) => break,
        }
    }
    reaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_group_is_noop() {
        assert_eq!(reap_children(0), 0);
        // no such group: ECHILD
        assert_eq!(reap_children(i32::MAX - 7), 0);
    }
}
