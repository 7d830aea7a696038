//! Directory-registration client.
//!
//! After binding, the session may report its resolved address and
//! session identifier to an external directory service. The call is
//! fire-and-forget: failures are logged and never propagated, and the
//! report sits entirely outside the checkpoint protocol.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::RegistryConfig;

/// Registration payload posted to the directory service.
#[derive(Debug, Serialize)]
struct RegistrationReport<'a> {
    session_id: &'a str,
    address: &'a str,
}

/// Report the resolved address to the directory service.
pub async fn report_address(registry: &RegistryConfig, session_id: &str, address: &str) {
    let url = format!("{}/sessions", registry.base_url.trim_end_matches('/'));
    let report = RegistrationReport {
        session_id,
        address,
    };

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            warn!(%err, "failed to build registry client");
            return;
        }
    };

    match client.post(&url).json(&report).send().await {
        Ok(response) if response.status().is_success() => {
            info!(session_id, address, "registered with directory service");
        }
        Ok(response) => {
            warn!(status = %response.status(), "directory service rejected registration");
        }
        Err(err) => {
            warn!(%err, "failed to reach directory service");
        }
    }
}
