//! Protocol message types

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::headers::Headers;
use crate::{EndpointId, RequestId};

/// Errors produced while interpreting message payloads
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("invalid base64 body: {0}")]
    InvalidBody(#[from] base64::DecodeError),
}

/// First message sent by the relay once a tunnel is established
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Handshake {
    pub endpoint: EndpointId,
}

/// HTTP request shipped from the relay down the tunnel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyRequest {
    pub uuid: RequestId,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body_base64: String,
}

impl ProxyRequest {
    /// Build the wire request for an external call identified by `uuid`
    pub fn new(uuid: RequestId, parts: RequestParts) -> Self {
        Self {
            uuid,
            method: parts.method,
            path: parts.path,
            headers: parts.headers,
            body_base64: STANDARD.encode(&parts.body),
        }
    }

    /// Decode the request body
    pub fn body(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(STANDARD.decode(&self.body_base64)?)
    }
}

/// HTTP response shipped from the tunnel client back up to the relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyResponse {
    pub uuid: RequestId,
    pub status: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body_base64: String,
}

impl ProxyResponse {
    pub fn new(uuid: RequestId, status: u16, headers: Headers, body: &[u8]) -> Self {
        Self {
            uuid,
            status,
            headers,
            body_base64: STANDARD.encode(body),
        }
    }

    /// Decode the response body
    ///
    /// Undecodable bodies are a per-request failure; the tunnel stays usable.
    pub fn body(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(STANDARD.decode(&self.body_base64)?)
    }
}

/// An external HTTP call before it has been assigned a request id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParts {
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub body: Bytes,
}

/// Any message the relay may send to a tunnel client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServerMessage {
    Handshake(Handshake),
    Request(ProxyRequest),
}
