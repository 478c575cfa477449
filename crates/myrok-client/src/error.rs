//! Client error types

use myrok_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Invalid handshake: {0}")]
    Handshake(String),

    #[error("Tunnel connection lost: {0}")]
    ConnectionLost(#[from] TransportError),

    #[error("Upstream request failed: {0}")]
    Upstream(String),
}
