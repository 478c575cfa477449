//! Tunnel Protocol Definitions
//!
//! This crate defines the messages exchanged over a tunnel connection between the
//! public relay and a private-side client, and the JSON codec used to frame them.

pub mod codec;
pub mod headers;
pub mod messages;

pub use codec::{CodecError, MessageCodec};
pub use headers::Headers;
pub use messages::*;

/// Identifier routing external HTTP calls to a live tunnel
pub type EndpointId = String;

/// Identifier correlating one proxied request with its response
pub type RequestId = String;

/// Path the tunnel client connects to
pub const TUNNEL_PATH: &str = "/proxy";

/// Generate a fresh endpoint identifier
pub fn new_endpoint_id() -> EndpointId {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a fresh request identifier
pub fn new_request_id() -> RequestId {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = new_endpoint_id();
        let b = new_endpoint_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
        assert_ne!(new_request_id(), new_request_id());
    }
}
