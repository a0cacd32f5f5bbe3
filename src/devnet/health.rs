//! Node health checking
//!
//! A node is healthy when its status endpoint answers within the attempt
//! timeout with a JSON body. The payload shape belongs to the node
//! binary and is not interpreted here.

use crate::config::schema::HealthConfig;
use crate::error::{HydraError, HydraResult};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// One blocking probe against a status endpoint
fn probe(url: &str, timeout: Duration) -> Result<(), String> {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let mut response = agent.get(url).call().map_err(|e| e.to_string())?;
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| e.to_string())?;

    serde_json::from_str::<serde_json::Value>(&body)
        .map(|_| ())
        .map_err(|e| format!("unparseable status payload: {e}"))
}

/// Poll a node's status endpoint until it responds healthy or the
/// deadline passes.
pub async fn wait_healthy(rpc_port: u16, config: &HealthConfig) -> HydraResult<()> {
    let url = format!("http://127.0.0.1:{rpc_port}{}", config.endpoint);
    let deadline = Instant::now() + Duration::from_secs(config.timeout_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let attempt_timeout = Duration::from_secs(config.attempt_timeout_secs);

    let mut last_error = String::from("not attempted");
    loop {
        let attempt_url = url.clone();
        let outcome = tokio::task::spawn_blocking(move || probe(&attempt_url, attempt_timeout))
            .await
            .map_err(|e| HydraError::Internal(format!("health probe task: {e}")))?;

        match outcome {
            Ok(()) => {
                debug!("Node on port {rpc_port} is healthy");
                return Ok(());
            }
            Err(e) => last_error = e,
        }

        if Instant::now() + poll_interval >= deadline {
            return Err(HydraError::Timeout {
                operation: format!("health check on port {rpc_port} ({last_error})"),
                secs: config.timeout_secs,
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}
