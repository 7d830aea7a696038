//! Break/restart lifecycle loop.
//!
//! Each iteration builds a fresh listener, binds a fresh controller,
//! blocks until a break is requested, drains the listener, reads the
//! break reason, and dispatches the matching checkpoint handler. A
//! listener instance is never reused across a dispatch.
//!
//! The combination of fork with threads is the dangerous part here:
//! after a fork only async-signal-safe calls are allowed until exec,
//! which never happens. Every listener lifetime therefore runs on its
//! own current-thread runtime, built and dropped inside the iteration,
//! so the process is effectively single-threaded again before any
//! checkpoint handler can fork.

use std::sync::Arc;

use tracing::{error, info};

use crate::checkpoint;
use crate::config::{GlobalConfig, ListenAddress};
use crate::controller::{BreakReason, SessionController, SharedSession};
use crate::listener;
use crate::registry;

/// Serve one listener instance to completion and return the break
/// reason that stopped it.
///
/// Blocks the calling thread. On return the listener, all of its
/// connection tasks, and the runtime that drove them are gone.
pub fn serve_once(
    session: &SharedSession,
    config: &Arc<GlobalConfig>,
    address: &ListenAddress,
) -> BreakReason {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build listener runtime");
            return BreakReason::Error;
        }
    };

    let reason = runtime.block_on(async {
        let (bound, resolved) = match listener::bind(address).await {
            Ok(bound) => bound,
            Err(err) => {
                error!(%err, "listener failed to start");
                return BreakReason::Error;
            }
        };

        let controller = Arc::new(SessionController::new(Arc::clone(session)));

        let report = {
            let mut guard = session.lock().await;
            guard.address = resolved.clone();
            guard.session_id.clone()
        };
        info!(pid = std::process::id(), address = %resolved, "session listening");

        // Fire-and-forget, outside the checkpoint protocol.
        if let (Some(registry_config), Some(session_id)) = (config.registry.as_ref(), report) {
            registry::report_address(registry_config, &session_id, &resolved).await;
        }

        listener::serve(bound, Arc::clone(&controller), Arc::clone(config)).await;

        // The listener has fully stopped; this is the one read of the
        // break reason for this instance.
        session
            .lock()
            .await
            .break_reason
            .take()
            .unwrap_or(BreakReason::Error)
    });

    // Dropping the runtime joins any remaining worker threads before a
    // checkpoint handler may fork.
    drop(runtime);
    reason
}

/// Run the break/restart loop forever.
///
/// The loop only ends by process exit inside a checkpoint handler.
pub fn run_forever(session: &SharedSession, config: &Arc<GlobalConfig>, address: &ListenAddress) -> ! {
    let mut address = address.clone();
    loop {
        let reason = serve_once(session, config, &address);

        // An OS-assigned port or generated socket path is resolved on
        // the first bind; later iterations rebind that same address so
        // the session stays reachable across checkpoints.
        let resolved = session.blocking_lock().address.clone();
        if let Ok(parsed) = ListenAddress::parse(&resolved) {
            address = parsed;
        }
        match reason {
            BreakReason::Snapshot => {
                info!("break due to snapshot");
                checkpoint::snapshot(session);
            }
            BreakReason::Rollback => {
                info!("break due to rollback");
                checkpoint::rollback(session);
            }
            BreakReason::Shutdown => {
                info!("shutting down");
                checkpoint::shutdown(session);
            }
            BreakReason::Error => {
                error!("listener creation failed");
                checkpoint::shutdown(session);
            }
        }
    }
}
