//! One-shot crypto engine health probe.
//!
//! After the supervisor starts the sidecar, the node gives it a
//! short grace period to bind, then pings it once over gRPC. The
//! outcome is logged either way; a failed probe never stops the
//! node.

use std::time::Duration;

use tonic::transport::Endpoint;

use veilchat_engine::proto::PingRequest;
use veilchat_engine::CryptoEngineClient;
use veilchat_types::{Result, VeilError};

/// Startup grace before the first probe.
const STARTUP_GRACE: Duration = Duration::from_secs(1);

/// Connect and request timeout for the probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Waits out the startup grace, pings the engine once, and logs the
/// result. Spawned as a fire-and-forget task.
pub async fn probe_engine(port: u16) {
    tokio::time::sleep(STARTUP_GRACE).await;
    match ping_engine(port).await {
        Ok((message, timestamp)) => {
            tracing::info!(port, %message, timestamp, "crypto engine healthy");
        }
        Err(e) => {
            tracing::warn!(port, %e, "crypto engine health check failed");
        }
    }
}

/// Sends a single Ping to the engine on loopback.
///
/// # Errors
///
/// Returns [`VeilError::HealthCheck`] for connect failures, RPC
/// errors, or timeouts.
async fn ping_engine(port: u16) -> Result<(String, i64)> {
    let endpoint = Endpoint::from_shared(format!("http://127.0.0.1:{port}"))
        .map_err(|e| VeilError::HealthCheck {
            reason: format!("invalid engine endpoint: {e}"),
        })?
        .connect_timeout(PROBE_TIMEOUT)
        .timeout(PROBE_TIMEOUT);

    let channel = endpoint.connect().await.map_err(|e| VeilError::HealthCheck {
        reason: format!("failed to connect to engine on port {port}: {e}"),
    })?;

    let mut client = CryptoEngineClient::new(channel);
    let response = client
        .ping(PingRequest {})
        .await
        .map_err(|e| VeilError::HealthCheck {
            reason: format!("engine ping failed: {e}"),
        })?
        .into_inner();

    Ok((response.message, response.timestamp))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::transport::Server;
    use veilchat_engine::{CryptoEngineServer, EngineService};

    #[tokio::test]
    async fn ping_against_live_engine_succeeds() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

        let server = tokio::spawn(async move {
            Server::builder()
                .add_service(CryptoEngineServer::new(EngineService))
                .serve_with_incoming(incoming)
                .await
        });

        let (message, timestamp) = ping_engine(port).await.unwrap();
        assert!(message.contains("pong"));
        assert!(timestamp > 0);

        server.abort();
    }

    #[tokio::test]
    async fn ping_against_dead_port_fails() {
        // Bind-then-drop guarantees nothing listens on the port.
        let port = {
            let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = ping_engine(port).await.unwrap_err();
        assert!(matches!(err, VeilError::HealthCheck { .. }));
    }
}
