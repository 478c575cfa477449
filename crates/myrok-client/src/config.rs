//! Client configuration

use myrok_proto::TUNNEL_PATH;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the relay, e.g. `wss://relay.example.com`
    pub server_url: String,
    /// Base URL of the local service requests are forwarded to
    pub local_url: String,
    /// Deadline for one call to the local service
    pub upstream_timeout: Duration,
    /// Deadline for the WebSocket connect and handshake
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// WebSocket URL of the relay's tunnel endpoint
    ///
    /// `http`/`https` schemes are mapped to `ws`/`wss`; a missing scheme means `ws`.
    pub fn proxy_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            format!("ws://{}", base)
        };

        if base.ends_with(TUNNEL_PATH) {
            base
        } else {
            format!("{}{}", base, TUNNEL_PATH)
        }
    }

    /// Public HTTP URL external callers use to reach `endpoint`
    pub fn public_url(&self, endpoint: &str) -> String {
        let proxy_url = self.proxy_url();
        let base = proxy_url.strip_suffix(TUNNEL_PATH).unwrap_or(&proxy_url);
        let base = if let Some(rest) = base.strip_prefix("wss://") {
            format!("https://{}", rest)
        } else if let Some(rest) = base.strip_prefix("ws://") {
            format!("http://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/{}", base, endpoint)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8080".to_string(),
            local_url: "http://localhost:3000".to_string(),
            upstream_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(server_url: &str) -> ClientConfig {
        ClientConfig {
            server_url: server_url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_proxy_url() {
        assert_eq!(
            config("https://relay.example.com").proxy_url(),
            "wss://relay.example.com/proxy"
        );
        assert_eq!(
            config("http://127.0.0.1:8080/").proxy_url(),
            "ws://127.0.0.1:8080/proxy"
        );
        assert_eq!(
            config("ws://127.0.0.1:8080/proxy").proxy_url(),
            "ws://127.0.0.1:8080/proxy"
        );
        assert_eq!(
            config("localhost:9000").proxy_url(),
            "ws://localhost:9000/proxy"
        );
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            config("wss://relay.example.com").public_url("abc"),
            "https://relay.example.com/abc"
        );
        assert_eq!(
            config("http://127.0.0.1:8080").public_url("abc"),
            "http://127.0.0.1:8080/abc"
        );
    }
}
