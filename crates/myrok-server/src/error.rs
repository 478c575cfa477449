//! Errors surfaced to external callers and would-be tunnel clients

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use myrok_control::SessionError;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("WebSocket upgrade failed: {0}")]
    UpgradeFailure(String),

    #[error("No tunnel registered for endpoint {0}")]
    UnknownEndpoint(String),

    #[error("Tunnel did not answer in time")]
    RequestTimeout,

    #[error("Tunnel returned an invalid response: {0}")]
    MalformedResponse(String),

    #[error("Request body could not be read: {0}")]
    InvalidRequestBody(String),

    #[error("Tunnel closed while the request was in flight")]
    TunnelClosed,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UpgradeFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
            ProxyError::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::MalformedResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::TunnelClosed => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short body text returned to the caller
    fn public_message(&self) -> &'static str {
        match self {
            ProxyError::UpgradeFailure(_) => "Tunnel upgrade failed",
            ProxyError::UnknownEndpoint(_) => "Not Found",
            ProxyError::RequestTimeout => "Gateway Timeout",
            ProxyError::MalformedResponse(_) => "Invalid proxy response",
            ProxyError::InvalidRequestBody(_) => "Invalid body",
            ProxyError::TunnelClosed => "Tunnel closed",
        }
    }
}

impl From<SessionError> for ProxyError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Timeout(_) => ProxyError::RequestTimeout,
            SessionError::Encode(reason) => ProxyError::InvalidRequestBody(reason),
            SessionError::Terminated | SessionError::Handshake(_) => ProxyError::TunnelClosed,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            ProxyError::UnknownEndpoint(_) => debug!("{}", self),
            _ => warn!("{}", self),
        }
        (self.status(), self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::UnknownEndpoint("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProxyError::from(SessionError::Timeout(Duration::from_secs(10))).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProxyError::from(SessionError::Terminated).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::InvalidRequestBody("eof".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::MalformedResponse("base64".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
