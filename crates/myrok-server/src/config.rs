//! Relay server configuration

use myrok_control::SessionConfig;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the public HTTP listener binds to
    pub bind_addr: SocketAddr,
    /// Deadline for one proxied call
    pub request_timeout: Duration,
    /// Bound on the best-effort close frame sent when a tunnel tears down
    pub close_timeout: Duration,
    /// Largest external request body accepted for forwarding
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            request_timeout: self.request_timeout,
            close_timeout: self.close_timeout,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_timeout: session.request_timeout,
            close_timeout: session.close_timeout,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}
