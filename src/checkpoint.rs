//! Fork-and-signal checkpoint protocol.
//!
//! Snapshot, rollback, and shutdown are implemented as a handoff
//! protocol over a chain of OS processes, built from two primitives:
//! forking a child and a stop/continue signal handshake with the direct
//! parent. No machine state is ever serialized; the checkpoint is the
//! parked parent process itself, blocked in `waitpid`.
//!
//! `Session::forked` is true iff this process was created as the live
//! branch of a prior snapshot, meaning exactly one ancestor is parked
//! one level up, ready to resume.
//!
//! Every handler here runs after the listener runtime has been dropped,
//! so the process holds no other live threads at fork time.

#![allow(unsafe_code)]

use tracing::error;

use crate::controller::SharedSession;

/// Take a snapshot: park this process and continue in a fresh child.
///
/// If this process is itself a checkpoint child, it first replaces its
/// own parked parent via the stop/continue handshake, so each snapshot
/// adds exactly one process to the chain.
#[cfg(unix)]
pub fn snapshot(session: &SharedSession) {
    use nix::sys::signal::{kill, raise, Signal};
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    use nix::unistd::{fork, ForkResult};
    use tracing::info;

    let mut guard = session.blocking_lock();

    // A parked parent is waiting on us. Wake it by stopping ourselves;
    // it will resume us with SIGCONT and exit, and we permanently take
    // its place at this ancestry level.
    if guard.forked {
        if let Err(err) = raise(Signal::SIGSTOP) {
            error!(%err, "failed to stop for parent handoff");
            return;
        }
        guard.forked = false;
    }

    // SAFETY: the listener runtime and all of its tasks were torn down
    // and joined before dispatch, so no other thread exists in this
    // process when fork runs.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            // The child goes on with the next loop iteration as the
            // live branch, exactly where the snapshot was requested.
            guard.forked = true;
            info!(pid = std::process::id(), "snapshot child live");
        }
        Ok(ForkResult::Parent { child }) => {
            match waitpid(child, Some(WaitPidFlag::WUNTRACED)) {
                Ok(WaitStatus::Stopped(pid, _)) => {
                    // The child wants to take our place. Wake it and exit.
                    let _ = kill(pid, Signal::SIGCONT);
                    std::process::exit(0);
                }
                Ok(_) => {
                    // The child exited: a rollback occurred below. We
                    // resume as the live branch, as if the snapshot and
                    // everything after it never happened.
                    guard.forked = false;
                    info!(pid = std::process::id(), "snapshot parent resumed");
                }
                Err(err) => {
                    error!(%err, "waitpid failed; resuming as live branch");
                    guard.forked = false;
                }
            }
        }
        Err(err) => {
            // No snapshot was taken; this process stays live.
            error!(%err, "fork failed");
        }
    }
}

/// Roll back: discard this process so the parked parent resumes.
///
/// The controller rejects rollback unless `forked` is set, so reaching
/// this handler without a parked parent indicates a dispatch bug.
#[cfg(unix)]
pub fn rollback(session: &SharedSession) {
    let guard = session.blocking_lock();
    if guard.forked {
        // The parent's waitpid observes a normal exit and takes over,
        // discarding every effect performed since the snapshot.
        std::process::exit(0);
    }
    error!("rollback dispatched without an outstanding snapshot");
}

/// Shut down: retire this process, handing off to the parked parent
/// first when one exists.
///
/// With a chain deeper than two processes the grandparent observes the
/// parent's exit from its own `waitpid` and resumes as the live branch;
/// shutting down the whole chain takes one shutdown per level.
#[cfg(unix)]
pub fn shutdown(session: &SharedSession) {
    use nix::sys::signal::{raise, Signal};

    let mut guard = session.blocking_lock();
    if guard.forked {
        if let Err(err) = raise(Signal::SIGSTOP) {
            error!(%err, "failed to stop for parent handoff");
        } else {
            guard.forked = false;
        }
    }
    std::process::exit(0);
}

/// Snapshot is unavailable without POSIX job control; the session stays
/// live and no checkpoint is created.
#[cfg(not(unix))]
pub fn snapshot(_session: &SharedSession) {
    tracing::warn!("process checkpointing requires unix job control; snapshot ignored");
}

/// Rollback is unreachable without snapshots; log and continue.
#[cfg(not(unix))]
pub fn rollback(_session: &SharedSession) {
    error!("rollback dispatched without an outstanding snapshot");
}

/// Plain process exit; there is never a parked parent to hand off to.
#[cfg(not(unix))]
pub fn shutdown(_session: &SharedSession) {
    std::process::exit(0);
}
