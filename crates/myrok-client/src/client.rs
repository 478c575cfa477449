//! Tunnel client: connect, read the handshake, serve requests

use myrok_proto::{EndpointId, Handshake, MessageCodec, ServerMessage};
use myrok_transport::{TransportError, TransportResult, TunnelSink, TunnelSource, CLOSE_NORMAL};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::handler::RequestHandler;
use crate::websocket::{self, WsSink, WsSource};

/// Responses waiting for the writer
const WRITE_QUEUE: usize = 64;

/// Bound on the close frame sent when the client stops
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct TunnelClient {
    config: ClientConfig,
}

impl TunnelClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open a tunnel to the relay and wait for its endpoint id
    pub async fn connect(&self) -> Result<ConnectedTunnel, ClientError> {
        let url = self.config.proxy_url();
        info!("Connecting to relay at {}", url);

        let (stream, _response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| ClientError::Connect {
                    url: url.clone(),
                    reason: "timed out".to_string(),
                })?
                .map_err(|e| ClientError::Connect {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;

        let (sink, source) = websocket::split(stream);
        tokio::time::timeout(
            self.config.connect_timeout,
            ConnectedTunnel::handshake(sink, source, &self.config),
        )
        .await
        .map_err(|_| ClientError::Handshake("timed out".to_string()))?
    }
}

/// A tunnel that has received its endpoint id
pub struct ConnectedTunnel<S = WsSink, R = WsSource> {
    endpoint: EndpointId,
    public_url: String,
    sink: S,
    source: R,
}

impl<S, R> ConnectedTunnel<S, R>
where
    S: TunnelSink,
    R: TunnelSource,
{
    /// Read the relay's handshake from an open transport
    pub async fn handshake(
        sink: S,
        mut source: R,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let payload = source
            .recv()
            .await?
            .ok_or_else(|| ClientError::Handshake("connection closed".to_string()))?;
        let handshake: Handshake =
            MessageCodec::decode(&payload).map_err(|e| ClientError::Handshake(e.to_string()))?;

        let public_url = config.public_url(&handshake.endpoint);
        info!("Tunnel ready: {}", public_url);

        Ok(Self {
            endpoint: handshake.endpoint,
            public_url,
            sink,
            source,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Serve requests until the relay closes the tunnel
    pub async fn run<H: RequestHandler>(self, handler: H) -> Result<(), ClientError> {
        self.run_until(handler, std::future::pending()).await
    }

    /// Serve requests until the relay closes the tunnel or `shutdown` resolves
    ///
    /// Each request is handled on its own task, so a slow request does not hold up
    /// the others. Responses are written back in completion order.
    pub async fn run_until<H, F>(self, handler: H, shutdown: F) -> Result<(), ClientError>
    where
        H: RequestHandler,
        F: Future<Output = ()>,
    {
        let ConnectedTunnel {
            endpoint,
            sink,
            mut source,
            ..
        } = self;

        let handler = Arc::new(handler);
        let (tx, rx) = mpsc::channel::<String>(WRITE_QUEUE);
        let mut writer = tokio::spawn(write_loop(sink, rx));
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Closing tunnel {}", endpoint);
                    break Ok(());
                }
                written = &mut writer => {
                    let e = match written {
                        Ok(Err(e)) => e,
                        _ => TransportError::ConnectionClosed,
                    };
                    break Err(ClientError::ConnectionLost(e));
                }
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                message = source.recv() => match message {
                    Ok(Some(payload)) => {
                        let request = match MessageCodec::decode(&payload) {
                            Ok(ServerMessage::Request(request)) => request,
                            Ok(ServerMessage::Handshake(_)) => {
                                warn!("Ignoring repeated handshake");
                                continue;
                            }
                            Err(e) => {
                                warn!("Ignoring undecodable tunnel message: {}", e);
                                continue;
                            }
                        };
                        debug!("[{}] {} {}", request.uuid, request.method, request.path);

                        let handler = handler.clone();
                        let tx = tx.clone();
                        tasks.spawn(async move {
                            let uuid = request.uuid.clone();
                            let response = handler.handle(request).await;
                            match MessageCodec::encode(&response) {
                                Ok(text) => {
                                    if tx.send(text).await.is_err() {
                                        debug!("[{}] Tunnel gone, dropping response", uuid);
                                    }
                                }
                                Err(e) => error!("[{}] Failed to encode response: {}", uuid, e),
                            }
                        });
                    }
                    Ok(None) => {
                        info!("Relay closed tunnel {}", endpoint);
                        break Ok(());
                    }
                    Err(e) => break Err(ClientError::ConnectionLost(e)),
                }
            }
        };

        tasks.shutdown().await;
        drop(tx);
        if !writer.is_finished() {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, writer).await;
        }

        result
    }
}

/// Write queued responses, then close the tunnel once every producer is gone
async fn write_loop<S: TunnelSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<String>,
) -> TransportResult<()> {
    while let Some(text) = rx.recv().await {
        if let Err(e) = sink.send_text(text).await {
            error!("Tunnel write failed: {}", e);
            return Err(e);
        }
    }

    if let Err(e) = sink.close(CLOSE_NORMAL, "client closing").await {
        debug!("Close frame not sent: {}", e);
    }
    Ok(())
}
