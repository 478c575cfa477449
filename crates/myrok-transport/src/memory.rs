//! In-memory tunnel transport
//!
//! Used to drive the session engine without sockets. The [`MemoryPeer`] plays the
//! role of the remote tunnel client.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{TransportError, TransportResult, TunnelSink, TunnelSource};

/// A frame written by the local sink, as observed by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryFrame {
    Text(String),
    Close { code: u16, reason: String },
}

type Inbound = TransportResult<Bytes>;

/// Create a connected sink/source pair and the peer on the other end
pub fn channel_pair() -> (MemorySink, MemorySource, MemoryPeer) {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    (
        MemorySink {
            tx: frame_tx,
            closed: false,
        },
        MemorySource { rx: inbound_rx },
        MemoryPeer {
            frames: frame_rx,
            sender: PeerSender { tx: inbound_tx },
        },
    )
}

pub struct MemorySink {
    tx: mpsc::UnboundedSender<MemoryFrame>,
    closed: bool,
}

#[async_trait]
impl TunnelSink for MemorySink {
    async fn send_text(&mut self, text: String) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(MemoryFrame::Text(text))
            .map_err(|_| TransportError::SendFailed("peer went away".to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.closed = true;
        self.tx
            .send(MemoryFrame::Close {
                code,
                reason: reason.to_string(),
            })
            .map_err(|_| TransportError::SendFailed("peer went away".to_string()))
    }
}

pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl TunnelSource for MemorySource {
    async fn recv(&mut self) -> TransportResult<Option<Bytes>> {
        match self.rx.recv().await {
            Some(Ok(payload)) => Ok(Some(payload)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// The remote end of an in-memory tunnel
pub struct MemoryPeer {
    frames: mpsc::UnboundedReceiver<MemoryFrame>,
    sender: PeerSender,
}

impl MemoryPeer {
    /// Next frame written by the local sink, `None` once the sink is dropped
    pub async fn next_frame(&mut self) -> Option<MemoryFrame> {
        self.frames.recv().await
    }

    /// Next text frame, `None` on close or when the sink is gone
    pub async fn next_text(&mut self) -> Option<String> {
        match self.frames.recv().await {
            Some(MemoryFrame::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Handle for pushing messages towards the local source
    pub fn sender(&self) -> PeerSender {
        self.sender.clone()
    }

    /// Stop reading; further writes by the local sink fail
    pub fn into_sender(self) -> PeerSender {
        self.sender
    }
}

/// Cloneable handle that feeds the local source
#[derive(Clone)]
pub struct PeerSender {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl PeerSender {
    /// Deliver one message payload; false if the source is gone
    pub fn send(&self, payload: impl Into<Bytes>) -> bool {
        self.tx.send(Ok(payload.into())).is_ok()
    }

    /// Make the next read on the local source fail
    pub fn fail(&self, reason: &str) -> bool {
        self.tx
            .send(Err(TransportError::ReceiveFailed(reason.to_string())))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_to_peer() {
        let (mut sink, _source, mut peer) = channel_pair();

        sink.send_text("hello".to_string()).await.unwrap();
        sink.close(1000, "bye").await.unwrap();

        assert_eq!(peer.next_frame().await, Some(MemoryFrame::Text("hello".into())));
        assert_eq!(
            peer.next_frame().await,
            Some(MemoryFrame::Close {
                code: 1000,
                reason: "bye".into()
            })
        );

        // Closed sink refuses further writes
        assert!(matches!(
            sink.send_text("late".to_string()).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_peer_to_source() {
        let (_sink, mut source, peer) = channel_pair();

        assert!(peer.sender().send("payload"));
        assert_eq!(source.recv().await.unwrap(), Some(Bytes::from("payload")));

        peer.sender().fail("boom");
        assert!(matches!(
            source.recv().await,
            Err(TransportError::ReceiveFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_peer_closes_both_directions() {
        let (mut sink, mut source, peer) = channel_pair();
        drop(peer);

        assert_eq!(source.recv().await.unwrap(), None);
        assert!(matches!(
            sink.send_text("x".to_string()).await,
            Err(TransportError::SendFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_into_sender_breaks_writes_only() {
        let (mut sink, mut source, peer) = channel_pair();
        let sender = peer.into_sender();

        assert!(sink.send_text("x".to_string()).await.is_err());
        assert!(sender.send("still readable"));
        assert_eq!(
            source.recv().await.unwrap(),
            Some(Bytes::from("still readable"))
        );
    }
}
