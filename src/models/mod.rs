//! Domain model module declarations.

pub mod access_log;
pub mod proof;
