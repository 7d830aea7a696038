//! Listener wire layer for session commands.
//!
//! Accepts connections on a TCP socket or Unix domain socket and speaks
//! line-delimited JSON with the client.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "create", "machine": { ... }}
//! {"command": "run", "limit": 500}
//! {"command": "step"}
//! {"command": "snapshot"}
//! {"command": "rollback"}
//! {"command": "shutdown"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... }}
//! {"ok": false, "error": {"kind": "invalid_argument", "message": "..."}}
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};

use crate::config::{GlobalConfig, ListenAddress, MachineConfig};
use crate::controller::SessionController;
use crate::{AppError, Result};

/// Inbound command request.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    /// Construct the machine; omitting `machine` uses the session default.
    Create {
        /// Machine construction parameters.
        #[serde(default)]
        machine: Option<MachineConfig>,
    },
    /// Advance the machine up to a cycle limit.
    Run {
        /// Target cycle counter.
        limit: u64,
    },
    /// Execute one verifiable micro-step.
    Step,
    /// Request a snapshot break.
    Snapshot,
    /// Request a rollback break.
    Rollback,
    /// Request a shutdown break.
    Shutdown,
    /// Increment the debug counter.
    Inc,
    /// Log and return the debug counter.
    Print,
}

/// Structured wire error: stable kind plus human-readable message.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireError {
    /// Stable error kind identifier.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

/// Outbound command response.
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    /// Successful response with a payload.
    #[must_use]
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response carrying the error's wire kind and message.
    #[must_use]
    pub fn failure(err: &AppError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(WireError {
                kind: err.kind_str().to_owned(),
                message: err.message().to_owned(),
            }),
        }
    }
}

/// A bound listener socket in one of the accepted address forms.
pub enum BoundListener {
    /// TCP socket.
    Tcp(TcpListener),
    /// Unix domain socket.
    #[cfg(unix)]
    Unix(UnixListener),
}

/// Bind a listener for the requested address form.
///
/// Returns the listener and the resolved address; for an OS-assigned
/// port or a generated socket path the resolved form is what callers
/// must be told about.
///
/// # Errors
///
/// Returns `AppError::Listener` when binding fails.
pub async fn bind(address: &ListenAddress) -> Result<(BoundListener, String)> {
    match address {
        ListenAddress::Tcp(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|err| AppError::Listener(format!("failed to bind {addr}: {err}")))?;
            let resolved = local_addr_string(&listener)?;
            Ok((BoundListener::Tcp(listener), resolved))
        }
        ListenAddress::AutoTcp => {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .map_err(|err| AppError::Listener(format!("failed to bind auto port: {err}")))?;
            let resolved = local_addr_string(&listener)?;
            Ok((BoundListener::Tcp(listener), resolved))
        }
        #[cfg(unix)]
        ListenAddress::Unix(path) => {
            // A listener instance is never reused, but the same path may
            // be rebound across break/restart iterations.
            let _ = std::fs::remove_file(path);
            let listener = UnixListener::bind(path)
                .map_err(|err| AppError::Listener(format!("failed to bind unix:{path}: {err}")))?;
            Ok((BoundListener::Unix(listener), format!("unix:{path}")))
        }
        #[cfg(unix)]
        ListenAddress::AutoUnix => {
            let path = generated_socket_path()?;
            let listener = UnixListener::bind(&path).map_err(|err| {
                AppError::Listener(format!("failed to bind unix:{}: {err}", path.display()))
            })?;
            Ok((BoundListener::Unix(listener), format!("unix:{}", path.display())))
        }
        #[cfg(not(unix))]
        ListenAddress::Unix(_) | ListenAddress::AutoUnix => Err(AppError::Listener(
            "unix socket listeners require a unix platform".into(),
        )),
    }
}

fn local_addr_string(listener: &TcpListener) -> Result<String> {
    Ok(listener
        .local_addr()
        .map_err(|err| AppError::Listener(format!("failed to read local address: {err}")))?
        .to_string())
}

/// Generate a socket path under a fresh private temp directory.
#[cfg(unix)]
fn generated_socket_path() -> Result<std::path::PathBuf> {
    let dir = std::env::temp_dir().join(format!("machine-session-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir)
        .map_err(|err| AppError::Listener(format!("failed to create socket dir: {err}")))?;
    Ok(dir.join("session.sock"))
}

/// Serve connections until the controller's teardown token fires.
///
/// Every connection task is tracked and joined before this returns, so
/// no listener task survives into checkpoint dispatch.
pub async fn serve(
    listener: BoundListener,
    controller: Arc<SessionController>,
    config: Arc<GlobalConfig>,
) {
    let ct = controller.teardown_token();
    let mut connections = JoinSet::new();

    loop {
        match &listener {
            BoundListener::Tcp(tcp) => {
                tokio::select! {
                    () = ct.cancelled() => break,
                    accepted = tcp.accept() => match accepted {
                        Ok((stream, _)) => {
                            let controller = Arc::clone(&controller);
                            let config = Arc::clone(&config);
                            connections.spawn(handle_connection(stream, controller, config));
                        }
                        Err(err) => warn!(%err, "accept failed"),
                    },
                }
            }
            #[cfg(unix)]
            BoundListener::Unix(unix) => {
                tokio::select! {
                    () = ct.cancelled() => break,
                    accepted = unix.accept() => match accepted {
                        Ok((stream, _)) => {
                            let controller = Arc::clone(&controller);
                            let config = Arc::clone(&config);
                            connections.spawn(handle_connection(stream, controller, config));
                        }
                        Err(err) => warn!(%err, "accept failed"),
                    },
                }
            }
        }
    }

    // Drain: every connection task observes the same token and exits
    // after finishing its in-flight command.
    while connections.join_next().await.is_some() {}
    info!("listener drained");
}

/// Handle a single client connection.
async fn handle_connection<S>(stream: S, controller: Arc<SessionController>, config: Arc<GlobalConfig>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let span = info_span!("connection");
    async move {
        let ct = controller.teardown_token();
        let (reader, mut writer) = tokio::io::split(stream);
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            let read = tokio::select! {
                () = ct.cancelled() => break,
                read = buf_reader.read_line(&mut line) => read,
            };
            match read {
                Ok(0) => break, // EOF
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<Request>(trimmed) {
                        Ok(request) => dispatch(request, &controller, &config).await,
                        Err(err) => Response::failure(&AppError::InvalidArgument(format!(
                            "invalid request: {err}"
                        ))),
                    };

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":{"kind":"unknown","message":"serialization failed"}}"#
                            .to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "read error");
                    break;
                }
            }
        }
    }
    .instrument(span)
    .await;
}

/// Route a command to the controller and shape its wire response.
async fn dispatch(
    request: Request,
    controller: &SessionController,
    config: &GlobalConfig,
) -> Response {
    let span = info_span!("command", command = command_name(&request));
    async move {
        let result = match request {
            Request::Create { machine } => {
                let machine_config = machine.unwrap_or_else(|| config.machine.clone());
                controller
                    .create(&machine_config)
                    .await
                    .map(|()| serde_json::json!({}))
            }
            Request::Run { limit } => controller
                .run(limit)
                .await
                .map(|(cycle, output)| serde_json::json!({ "cycle": cycle, "output": output })),
            Request::Step => controller
                .step()
                .await
                .map(|log| serde_json::json!({ "access_log": log })),
            Request::Snapshot => {
                controller.snapshot().await;
                Ok(serde_json::json!({}))
            }
            Request::Rollback => controller.rollback().await.map(|()| serde_json::json!({})),
            Request::Shutdown => {
                controller.shutdown().await;
                Ok(serde_json::json!({}))
            }
            Request::Inc => Ok(serde_json::json!({ "counter": controller.inc().await })),
            Request::Print => {
                let counter = controller.read_counter().await;
                info!(counter, "debug counter");
                Ok(serde_json::json!({ "counter": counter }))
            }
        };

        match result {
            Ok(data) => Response::success(data),
            Err(err) => {
                warn!(%err, "command rejected");
                Response::failure(&err)
            }
        }
    }
    .instrument(span)
    .await
}

fn command_name(request: &Request) -> &'static str {
    match request {
        Request::Create { .. } => "create",
        Request::Run { .. } => "run",
        Request::Step => "step",
        Request::Snapshot => "snapshot",
        Request::Rollback => "rollback",
        Request::Shutdown => "shutdown",
        Request::Inc => "inc",
        Request::Print => "print",
    }
}
