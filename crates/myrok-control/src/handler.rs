//! Tunnel connection handler

use myrok_proto::{new_endpoint_id, EndpointId, Handshake, MessageCodec};
use myrok_transport::{TunnelSink, TunnelSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::SessionError;
use crate::pump;
use crate::registry::SessionRegistry;
use crate::session::{CloseReason, Session};

/// Timing knobs for tunnel sessions
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for one proxied call, measured from its submission
    pub request_timeout: Duration,
    /// Bound on the best-effort close frame when a tunnel tears down
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(3),
        }
    }
}

/// Drives a tunnel connection from handshake to teardown
pub struct TunnelHandler {
    registry: Arc<SessionRegistry>,
    config: SessionConfig,
}

impl TunnelHandler {
    pub fn new(registry: Arc<SessionRegistry>, config: SessionConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Serve one tunnel connection until it closes
    ///
    /// Registers a new session, announces its endpoint id to the client, then runs
    /// the pump. The session is unregistered before this returns.
    pub async fn handle_tunnel<S, R>(
        &self,
        mut sink: S,
        source: R,
    ) -> Result<EndpointId, SessionError>
    where
        S: TunnelSink,
        R: TunnelSource,
    {
        let endpoint_id = new_endpoint_id();
        let (session, outbound) = Session::new(endpoint_id.clone());

        // Registered before the client learns the id, so its first caller can find it
        self.registry.register(endpoint_id.clone(), session.clone());
        info!("Tunnel opened: {}", endpoint_id);

        if let Err(e) = self.send_handshake(&mut sink, &endpoint_id).await {
            error!("[{}] write: {}", endpoint_id, e);
            session.begin_close(CloseReason::SendFailed);
            let reason = CloseReason::SendFailed;
            let _ = tokio::time::timeout(
                self.config.close_timeout,
                sink.close(reason.close_code(), reason.description()),
            )
            .await;
            session.finish();
            self.registry.unregister(&endpoint_id);
            return Err(e);
        }

        pump::run(
            session.clone(),
            outbound,
            sink,
            source,
            self.config.close_timeout,
        )
        .await;

        session.finish();
        self.registry.unregister(&endpoint_id);

        match session.close_reason() {
            Some(CloseReason::Shutdown) | Some(CloseReason::PeerClosed) | None => {
                info!(
                    "Tunnel closed: {} (up {:?})",
                    endpoint_id,
                    session.uptime()
                )
            }
            Some(reason) => warn!(
                "Tunnel closed: {} after {:?} (up {:?})",
                endpoint_id,
                reason,
                session.uptime()
            ),
        }

        Ok(endpoint_id)
    }

    async fn send_handshake<S: TunnelSink>(
        &self,
        sink: &mut S,
        endpoint_id: &str,
    ) -> Result<(), SessionError> {
        let handshake = Handshake {
            endpoint: endpoint_id.to_string(),
        };
        let text =
            MessageCodec::encode(&handshake).map_err(|e| SessionError::Handshake(e.to_string()))?;

        sink.send_text(text)
            .await
            .map_err(|e| SessionError::Handshake(e.to_string()))
    }
}
