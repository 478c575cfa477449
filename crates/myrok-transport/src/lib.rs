//! Transport abstraction layer for tunnel connections
//!
//! A tunnel is a single duplex message connection (a WebSocket in production). The
//! session engine drives it through two halves so that sending and receiving can
//! run concurrently:
//!
//! ```text
//!        ┌──────────────┐   send_text / close   ┌─────────────┐
//!        │ sender loop  │ ────────────────────▶ │ TunnelSink  │
//!        └──────────────┘                       └─────────────┘
//!        ┌──────────────┐        recv           ┌─────────────┐
//!        │ receiver loop│ ◀──────────────────── │ TunnelSource│
//!        └──────────────┘                       └─────────────┘
//! ```

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use memory::{
    channel_pair, MemoryFrame, MemoryPeer, MemorySink, MemorySource, PeerSender,
};

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;

/// Endpoint is going away (server shutdown)
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Abnormal closure, sent when a transport error tears a tunnel down
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Sending half of a tunnel connection
#[async_trait]
pub trait TunnelSink: Send + 'static {
    /// Write one text message
    async fn send_text(&mut self, text: String) -> TransportResult<()>;

    /// Send a close control frame and shut the sending side down
    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()>;
}

/// Receiving half of a tunnel connection
#[async_trait]
pub trait TunnelSource: Send + 'static {
    /// Read the payload of the next data message
    ///
    /// Returns `None` once the peer has closed the connection. Control frames
    /// (ping/pong) are consumed internally.
    async fn recv(&mut self) -> TransportResult<Option<Bytes>>;
}
