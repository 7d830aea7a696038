//! Session controller: the mutually-exclusive command plane.
//!
//! One lock serializes every command against the session, so no two
//! operations' effects or observations ever interleave, no matter how
//! many listener tasks exist. Break requests set the break reason (first
//! request wins for a given listener instance) and trigger the listener
//! teardown token exactly once.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::MachineConfig;
use crate::machine::{build_machine, MachineDriver};
use crate::models::access_log::AccessLog;
use crate::{AppError, Result};

/// Why the listener is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    /// Fork a checkpoint child and park this process.
    Snapshot,
    /// Discard this process; the parked parent resumes.
    Rollback,
    /// Terminate the checkpoint chain.
    Shutdown,
    /// Listener failed to start; treated identically to `Shutdown`.
    Error,
}

/// Per-process session state.
///
/// Owned by the process and created at startup; mutated only under the
/// controller's lock, except `forked`, which the checkpoint protocol
/// mutates with the listener already torn down.
pub struct Session {
    /// Optional identifier reported to the registry.
    pub session_id: Option<String>,
    /// Listen address; replaced with the resolved form after binding.
    pub address: String,
    /// True iff this process is the live branch of a prior snapshot.
    pub forked: bool,
    /// Break reason for the current listener instance; set at most once
    /// per listener lifetime and read exactly once by the lifecycle loop.
    pub break_reason: Option<BreakReason>,
    /// The one active machine handle, if any.
    pub machine: Option<Box<dyn MachineDriver>>,
    /// Debug counter exercised by the `inc`/`print` commands.
    pub counter: u64,
}

impl Session {
    /// Construct the per-process session state.
    #[must_use]
    pub fn new(session_id: Option<String>, address: String) -> Self {
        Self {
            session_id,
            address,
            forked: false,
            break_reason: None,
            machine: None,
            counter: 0,
        }
    }
}

/// Session state shared between the controller, the lifecycle loop, and
/// the checkpoint protocol.
pub type SharedSession = Arc<Mutex<Session>>;

/// Serialized command surface over one session.
///
/// A fresh controller is built for every listener instance; its teardown
/// token belongs to that instance alone.
pub struct SessionController {
    session: SharedSession,
    teardown: CancellationToken,
}

impl SessionController {
    /// Bind a controller to the session for one listener instance.
    #[must_use]
    pub fn new(session: SharedSession) -> Self {
        Self {
            session,
            teardown: CancellationToken::new(),
        }
    }

    /// Token cancelled by the first break request on this listener.
    #[must_use]
    pub fn teardown_token(&self) -> CancellationToken {
        self.teardown.clone()
    }

    /// Record a break reason and start teardown.
    ///
    /// The first break on a listener instance wins; later requests are
    /// no-ops, keeping teardown idempotent.
    fn set_break(&self, session: &mut Session, reason: BreakReason) {
        if session.break_reason.is_none() {
            session.break_reason = Some(reason);
            self.teardown.cancel();
        }
    }

    /// Construct the machine collaborator and make it active.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if a machine is already active, or
    /// `Unknown` wrapping the collaborator's failure message when
    /// construction fails.
    pub async fn create(&self, config: &MachineConfig) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.machine.is_some() {
            return Err(AppError::AlreadyExists(
                "there is already an active machine".into(),
            ));
        }
        let machine = build_machine(config).map_err(|err| {
            AppError::Unknown(format!("failed to instantiate machine: {err}"))
        })?;
        session.machine = Some(machine);
        info!("machine created");
        Ok(())
    }

    /// Advance the machine until `cycle_limit` or a natural halt.
    ///
    /// Returns the resulting cycle counter and the external-interrupt
    /// output word.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` without an active machine, `InvalidArgument`
    /// for a zero or non-advancing limit, or `Unknown` wrapping a
    /// collaborator failure; the session remains usable afterward.
    pub async fn run(&self, cycle_limit: u64) -> Result<(u64, u64)> {
        let mut session = self.session.lock().await;
        let machine = session
            .machine
            .as_mut()
            .ok_or_else(|| AppError::NotFound("no active machine; create one before run".into()))?;

        if cycle_limit == 0 {
            return Err(AppError::InvalidArgument(
                "cycle limit must be greater than zero".into(),
            ));
        }
        let current = machine.read_cycle();
        if cycle_limit < current {
            return Err(AppError::InvalidArgument(format!(
                "cycle limit {cycle_limit} is behind the current machine cycle {current}"
            )));
        }

        machine
            .run(cycle_limit)
            .map_err(|err| AppError::Unknown(format!("machine run failed: {}", err.message())))?;

        let cycle = machine.read_cycle();
        let output = machine.read_output();
        info!(cycle, output, "run executed");
        Ok((cycle, output))
    }

    /// Execute exactly one verifiable micro-step.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` without an active machine, or `Unknown`
    /// wrapping a collaborator failure. Nothing raises past this
    /// boundary.
    pub async fn step(&self) -> Result<AccessLog> {
        let mut session = self.session.lock().await;
        let machine = session
            .machine
            .as_mut()
            .ok_or_else(|| AppError::NotFound("no active machine; create one before step".into()))?;

        let log = machine
            .step()
            .map_err(|err| AppError::Unknown(format!("machine step failed: {}", err.message())))?;
        info!(accesses = log.accesses.len(), "step executed");
        Ok(log)
    }

    /// Request a snapshot break. Always succeeds as a request; the
    /// checkpoint itself runs after the listener is torn down.
    pub async fn snapshot(&self) {
        let mut session = self.session.lock().await;
        self.set_break(&mut session, BreakReason::Snapshot);
    }

    /// Request a rollback break.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` unless this process is a checkpoint
    /// child; the rejection has no process-level side effect.
    pub async fn rollback(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if !session.forked {
            return Err(AppError::FailedPrecondition("no snapshot".into()));
        }
        self.set_break(&mut session, BreakReason::Rollback);
        Ok(())
    }

    /// Request a shutdown break. Always succeeds as a request.
    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        self.set_break(&mut session, BreakReason::Shutdown);
    }

    /// Increment the debug counter; exists purely as an example of a
    /// command sharing the session lock.
    pub async fn inc(&self) -> u64 {
        let mut session = self.session.lock().await;
        session.counter += 1;
        session.counter
    }

    /// Read the debug counter.
    pub async fn read_counter(&self) -> u64 {
        self.session.lock().await.counter
    }
}
