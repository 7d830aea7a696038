#![deny(unsafe_code)]

//! `machine-sessionctl` — command-line client for `machine-sessiond`.
//!
//! Connects to a running session over TCP or a Unix domain socket and
//! sends a single JSON command, printing the response.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "machine-sessionctl",
    about = "CLI client for machine-sessiond",
    version,
    long_about = None
)]
struct Cli {
    /// Server address: `<host>:<port>` or `unix:<path>`.
    #[arg(long)]
    address: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Construct the machine from the session default or a config file.
    Create {
        /// TOML file holding a `[machine]` table to send with the request.
        #[arg(long)]
        machine_config: Option<PathBuf>,
    },

    /// Advance the machine up to a cycle limit.
    Run {
        /// Target cycle counter.
        limit: u64,
    },

    /// Execute one verifiable micro-step and print its access log.
    Step,

    /// Request a snapshot checkpoint.
    Snapshot,

    /// Roll back to the most recent snapshot.
    Rollback,

    /// Shut down the session.
    Shutdown,

    /// Increment the debug counter.
    Inc,

    /// Print the debug counter.
    Print,
}

fn main() {
    let args = Cli::parse();

    let request_json = match build_request(&args.command) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    match send_command(&args.address, &request_json) {
        Ok(response) => {
            let ok = response
                .get("ok")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            if ok {
                match response.get("data") {
                    Some(data) => {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    }
                    None => println!("OK"),
                }
            } else {
                let message = response
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown error");
                let kind = response
                    .get("error")
                    .and_then(|e| e.get("kind"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown");
                eprintln!("Error ({kind}): {message}");
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("Failed to reach server at '{}': {err}", args.address);
            std::process::exit(1);
        }
    }
}

/// Shape the JSON request for a subcommand.
fn build_request(
    command: &Command,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    Ok(match command {
        Command::Create { machine_config } => {
            let mut request = serde_json::json!({ "command": "create" });
            if let Some(path) = machine_config {
                let raw = std::fs::read_to_string(path)?;
                let parsed: toml::Value = toml::from_str(&raw)?;
                let machine = parsed
                    .get("machine")
                    .cloned()
                    .ok_or("machine config file is missing a [machine] table")?;
                request["machine"] = serde_json::to_value(machine)?;
            }
            request
        }
        Command::Run { limit } => serde_json::json!({ "command": "run", "limit": limit }),
        Command::Step => serde_json::json!({ "command": "step" }),
        Command::Snapshot => serde_json::json!({ "command": "snapshot" }),
        Command::Rollback => serde_json::json!({ "command": "rollback" }),
        Command::Shutdown => serde_json::json!({ "command": "shutdown" }),
        Command::Inc => serde_json::json!({ "command": "inc" }),
        Command::Print => serde_json::json!({ "command": "print" }),
    })
}

/// Connect to the server, send one JSON line, and read the response line.
fn send_command(
    address: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');

    let response_line = if let Some(path) = address.strip_prefix("unix:") {
        #[cfg(unix)]
        {
            let mut stream = std::os::unix::net::UnixStream::connect(path)?;
            exchange(&mut stream, &request_line)?
        }
        #[cfg(not(unix))]
        {
            let _ = path;
            return Err("unix sockets are not supported on this platform".into());
        }
    } else {
        let mut stream = std::net::TcpStream::connect(address)?;
        exchange(&mut stream, &request_line)?
    };

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}

/// Write the request line and read one response line.
fn exchange<S: Read + Write>(
    stream: &mut S,
    request_line: &str,
) -> std::result::Result<String, Box<dyn std::error::Error>> {
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;
    Ok(response_line)
}
