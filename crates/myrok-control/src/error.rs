//! Session-level errors

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// No response arrived before the request deadline; the session stays usable
    #[error("No response from tunnel within {0:?}")]
    Timeout(Duration),

    /// The tunnel went away while the request was pending
    #[error("Tunnel session terminated")]
    Terminated,

    #[error("Failed to encode request: {0}")]
    Encode(String),

    #[error("Tunnel handshake failed: {0}")]
    Handshake(String),
}
