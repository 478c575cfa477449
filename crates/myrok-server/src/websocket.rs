//! Tunnel transport over an upgraded axum WebSocket

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use myrok_transport::{TransportError, TransportResult, TunnelSink, TunnelSource};
use tracing::trace;

/// Split an upgraded socket into the halves the session pump drives
pub fn split(socket: WebSocket) -> (WsSink, WsSource) {
    let (sink, stream) = socket.split();
    (WsSink { inner: sink }, WsSource { inner: stream })
}

pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl TunnelSink for WsSink {
    async fn send_text(&mut self, text: String) -> TransportResult<()> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()> {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        self.inner
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

pub struct WsSource {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl TunnelSource for WsSource {
    async fn recv(&mut self) -> TransportResult<Option<Bytes>> {
        while let Some(message) = self.inner.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(Bytes::from(text.as_str().to_owned()))),
                Ok(Message::Binary(data)) => return Ok(Some(data)),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pong is handled by the WebSocket implementation
                    trace!("Tunnel keepalive frame");
                }
                Ok(Message::Close(frame)) => {
                    trace!("Tunnel close frame: {:?}", frame);
                    return Ok(None);
                }
                Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
        Ok(None)
    }
}
