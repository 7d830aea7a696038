//! Verifiable machine session server.
//!
//! One process hosts at most one machine session. The listener speaks a
//! line-delimited JSON command protocol; snapshot, rollback, and
//! shutdown are realized by breaking the listener and handing control to
//! fork-based checkpoint handlers, so the process tree itself is the
//! undo history.

#![deny(unsafe_code)]

pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod errors;
pub mod lifecycle;
pub mod listener;
pub mod machine;
pub mod models;
pub mod registry;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
