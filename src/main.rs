#![deny(unsafe_code)]

//! `machine-sessiond` — verifiable machine session server binary.
//!
//! Bootstraps configuration and tracing, then runs the break/restart
//! lifecycle loop until a checkpoint handler terminates the process.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use machine_session::config::ListenAddress;
use machine_session::controller::Session;
use machine_session::{lifecycle, AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "machine-sessiond",
    about = "Verifiable machine session server",
    version,
    long_about = None
)]
struct Cli {
    /// Listen address: `<host>:<port>`, `unix:<path>`, `tcp` (OS-assigned
    /// port), or `unix` (generated socket path).
    address: String,

    /// Session identifier reported to the directory service.
    session_id: Option<String>,

    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let address = ListenAddress::parse(&args.address)?;
    let config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    let config = Arc::new(config);

    let session = Arc::new(Mutex::new(Session::new(
        args.session_id,
        address.to_string(),
    )));

    info!(pid = std::process::id(), address = %address, "machine-sessiond starting");
    lifecycle::run_forever(&session, &config, &address)
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
