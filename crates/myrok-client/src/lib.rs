//! Private-side myrok tunnel client
//!
//! Connects to a relay, learns its public endpoint id, and answers the requests
//! the relay ships down the tunnel with a [`RequestHandler`].

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod websocket;

pub use client::{ConnectedTunnel, TunnelClient};
pub use config::ClientConfig;
pub use error::ClientError;
pub use handler::{LocalForwarder, RequestHandler};
