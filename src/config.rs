//! Global configuration parsing, validation, and listen-address forms.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Word size in bytes, expressed as a power of two.
pub const WORD_LOG2_SIZE: u8 = 3;

/// Number of general-purpose machine registers.
pub const NUM_REGISTERS: usize = 8;

/// Address form the listener binds to.
///
/// Mirrors the forms accepted on the command line: an explicit
/// `host:port`, a filesystem socket (`unix:<path>`), or a request for an
/// OS-assigned endpoint (`tcp` / `unix`), in which case the resolved
/// address is reported back after binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    /// Explicit TCP `host:port`.
    Tcp(String),
    /// Filesystem socket at an explicit path.
    Unix(String),
    /// TCP on an OS-assigned port.
    AutoTcp,
    /// Filesystem socket at a generated path.
    AutoUnix,
}

impl ListenAddress {
    /// Parse a command-line address argument.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the argument matches none of the
    /// accepted forms.
    pub fn parse(arg: &str) -> Result<Self> {
        match arg {
            "tcp" => Ok(Self::AutoTcp),
            "unix" => Ok(Self::AutoUnix),
            other => {
                if let Some(path) = other.strip_prefix("unix:") {
                    if path.is_empty() {
                        return Err(AppError::Config("empty unix socket path".into()));
                    }
                    Ok(Self::Unix(path.to_owned()))
                } else if other.contains(':') {
                    Ok(Self::Tcp(other.to_owned()))
                } else {
                    Err(AppError::Config(format!(
                        "unrecognized address form '{other}': expected <host>:<port>, unix:<path>, tcp, or unix"
                    )))
                }
            }
        }
    }
}

impl Display for ListenAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            Self::Unix(path) => write!(f, "unix:{path}"),
            Self::AutoTcp => write!(f, "tcp"),
            Self::AutoUnix => write!(f, "unix"),
        }
    }
}

/// Construction parameters for the word machine.
///
/// Carried in the `create` command payload; the values in the global
/// config act as the session default when the request omits them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MachineConfig {
    /// Memory size in bytes, as a power of two. The Merkle tree covers
    /// this full range at word granularity.
    #[serde(default = "default_memory_log2_size")]
    pub memory_log2_size: u8,
    /// Initial memory image, one word per address starting at zero.
    #[serde(default)]
    pub program: Vec<u64>,
    /// Initial program counter (byte address, word aligned).
    #[serde(default)]
    pub entry_point: u64,
    /// Initial register file values; missing trailing registers are zero.
    #[serde(default)]
    pub registers: Vec<u64>,
}

fn default_memory_log2_size() -> u8 {
    12
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_log2_size: default_memory_log2_size(),
            program: Vec::new(),
            entry_point: 0,
            registers: Vec::new(),
        }
    }
}

impl MachineConfig {
    /// Number of words covered by the memory.
    #[must_use]
    pub fn word_count(&self) -> usize {
        1 << (self.memory_log2_size - WORD_LOG2_SIZE)
    }

    /// Validate structural constraints before machine construction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the memory size is out of bounds,
    /// the program does not fit, the entry point is unaligned or out of
    /// range, or too many register seeds are given.
    pub fn validate(&self) -> Result<()> {
        if self.memory_log2_size < WORD_LOG2_SIZE + 1 || self.memory_log2_size > 24 {
            return Err(AppError::Config(format!(
                "memory_log2_size must be between {} and 24",
                WORD_LOG2_SIZE + 1
            )));
        }
        if self.program.len() > self.word_count() {
            return Err(AppError::Config(format!(
                "program of {} words does not fit in {} words of memory",
                self.program.len(),
                self.word_count()
            )));
        }
        if self.entry_point % (1 << WORD_LOG2_SIZE) != 0 {
            return Err(AppError::Config("entry_point must be word aligned".into()));
        }
        if self.entry_point >= 1 << self.memory_log2_size {
            return Err(AppError::Config("entry_point is outside memory".into()));
        }
        if self.registers.len() > NUM_REGISTERS {
            return Err(AppError::Config(format!(
                "at most {NUM_REGISTERS} register seeds are supported"
            )));
        }
        Ok(())
    }
}

/// Directory service the session reports its resolved address to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RegistryConfig {
    /// Base URL of the directory service, e.g. `http://localhost:8000`.
    pub base_url: String,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Default machine construction parameters for `create` requests
    /// that omit an explicit config.
    #[serde(default)]
    pub machine: MachineConfig,
    /// Optional directory service to report the bound address to.
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.machine.validate()?;
        if let Some(ref registry) = self.registry {
            if registry.base_url.is_empty() {
                return Err(AppError::Config("registry.base_url must not be empty".into()));
            }
        }
        Ok(())
    }
}
