//! Machine collaborator contract and the deterministic reference machine.
//!
//! The session controller drives the machine exclusively through
//! [`MachineDriver`]; the trait is the seam where a full emulator would
//! plug in. [`word_machine::WordMachine`] is the deterministic reference
//! implementation shipped with the service.

pub mod merkle;
pub mod word_machine;

use crate::config::MachineConfig;
use crate::models::access_log::AccessLog;
use crate::Result;

/// Contract the controller uses to drive one machine instance.
pub trait MachineDriver: Send {
    /// Advance deterministically until the cycle counter reaches
    /// `cycle_limit` or the machine halts naturally.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Machine` on an internal interpretation failure;
    /// the controller converts this to `Unknown` at its boundary.
    fn run(&mut self, cycle_limit: u64) -> Result<()>;

    /// Execute exactly one verifiable micro-step and return its access log.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Machine` on an internal interpretation failure.
    fn step(&mut self) -> Result<AccessLog>;

    /// Current cycle counter.
    fn read_cycle(&self) -> u64;

    /// External-interrupt output word.
    fn read_output(&self) -> u64;

    /// Current program counter.
    fn read_pc(&self) -> u64;

    /// General-purpose register value; out-of-range indexes read zero.
    fn read_register(&self, index: usize) -> u64;

    /// Whether the machine has halted naturally.
    fn halted(&self) -> bool;
}

/// Construct the default machine collaborator from a config.
///
/// # Errors
///
/// Returns `AppError::Config` when the config fails validation.
pub fn build_machine(config: &MachineConfig) -> Result<Box<dyn MachineDriver>> {
    Ok(Box::new(word_machine::WordMachine::new(config)?))
}
