//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Listener failed to bind or serve.
    Listener(String),
    /// Registry report failure.
    Registry(String),
    /// Machine collaborator failure during construction or execution.
    Machine(String),
    /// A machine is already active in this session.
    AlreadyExists(String),
    /// No active machine (or other missing entity).
    NotFound(String),
    /// Malformed argument, e.g. a non-advancing cycle limit.
    InvalidArgument(String),
    /// Wrong session state for the request, e.g. rollback without a snapshot.
    FailedPrecondition(String),
    /// Recovered collaborator failure surfaced to the caller.
    Unknown(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Stable wire identifier for the error kind, used by the JSON protocol.
    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Listener(_) => "listener",
            Self::Registry(_) => "registry",
            Self::Machine(_) => "machine",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::FailedPrecondition(_) => "failed_precondition",
            Self::Unknown(_) => "unknown",
            Self::Io(_) => "io",
        }
    }

    /// Human-readable message without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Config(msg)
            | Self::Listener(msg)
            | Self::Registry(msg)
            | Self::Machine(msg)
            | Self::AlreadyExists(msg)
            | Self::NotFound(msg)
            | Self::InvalidArgument(msg)
            | Self::FailedPrecondition(msg)
            | Self::Unknown(msg)
            | Self::Io(msg) => msg,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Listener(msg) => write!(f, "listener: {msg}"),
            Self::Registry(msg) => write!(f, "registry: {msg}"),
            Self::Machine(msg) => write!(f, "machine: {msg}"),
            Self::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::FailedPrecondition(msg) => write!(f, "failed precondition: {msg}"),
            Self::Unknown(msg) => write!(f, "unknown: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
