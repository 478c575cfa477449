//! Tunnel session engine
//!
//! Owns the registry of live tunnels, the per-tunnel sender/receiver pump and the
//! correlation of proxied requests with the responses coming back up a tunnel.
pub mod error;
pub mod handler;
pub mod pending_requests;
mod pump;
pub mod registry;
pub mod session;

pub use error::SessionError;
pub use handler::{SessionConfig, TunnelHandler};
pub use pending_requests::PendingRequests;
pub use registry::SessionRegistry;
pub use session::{CloseReason, Session, SessionState};
