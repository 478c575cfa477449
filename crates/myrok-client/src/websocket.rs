//! Tunnel transport over a tokio-tungstenite client connection

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use myrok_transport::{TransportError, TransportResult, TunnelSink, TunnelSource};
use std::borrow::Cow;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn split(stream: WsStream) -> (WsSink, WsSource) {
    let (sink, stream) = stream.split();
    (WsSink { inner: sink }, WsSource { inner: stream })
}

pub struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TunnelSink for WsSink {
    async fn send_text(&mut self, text: String) -> TransportResult<()> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        self.inner
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

pub struct WsSource {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl TunnelSource for WsSource {
    async fn recv(&mut self) -> TransportResult<Option<Bytes>> {
        while let Some(message) = self.inner.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(Bytes::from(text))),
                Ok(Message::Binary(data)) => return Ok(Some(Bytes::from(data))),
                Ok(Message::Close(frame)) => {
                    debug!("Relay closed the tunnel: {:?}", frame);
                    return Ok(None);
                }
                Ok(other) => trace!("Skipping control frame: {:?}", other),
                Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
        Ok(None)
    }
}
