//! Codec for encoding/decoding tunnel messages
//!
//! Every message travels as one JSON document per WebSocket frame. Text and binary
//! frames are both accepted on decode.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),
}

/// Tunnel message codec
pub struct MessageCodec;

impl MessageCodec {
    /// Maximum message size (16MB)
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

    /// Encode a message as a JSON text frame payload
    pub fn encode<T: Serialize>(msg: &T) -> Result<String, CodecError> {
        let payload = serde_json::to_string(msg)?;

        if payload.len() > Self::MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(payload.len()));
        }

        Ok(payload)
    }

    /// Decode a message from a frame payload
    pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
        if payload.len() > Self::MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(payload.len()));
        }

        Ok(serde_json::from_slice(payload)?)
    }
}
