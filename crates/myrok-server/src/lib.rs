//! Public HTTP relay for myrok tunnels
//!
//! Accepts tunnel clients on `GET /proxy` and forwards every other request to the
//! tunnel named by its first path segment.

pub mod config;
pub mod convert;
pub mod error;
pub mod handlers;
pub mod websocket;

use axum::{extract::DefaultBodyLimit, routing::any, Router};
use myrok_control::{SessionRegistry, TunnelHandler};
use myrok_proto::TUNNEL_PATH;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub use config::ServerConfig;
pub use error::ProxyError;

/// Application state shared across handlers
pub struct AppState {
    pub tunnels: TunnelHandler,
    pub config: ServerConfig,
    /// One task per upgraded tunnel connection
    pub tunnel_tasks: TaskTracker,
}

pub struct RelayServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let tunnels = TunnelHandler::new(registry, config.session_config());
        let state = Arc::new(AppState {
            tunnels,
            config: config.clone(),
            tunnel_tasks: TaskTracker::new(),
        });

        Self { config, state }
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.state.tunnels.registry().clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        Router::new()
            .route(TUNNEL_PATH, any(handlers::tunnel_upgrade))
            .fallback(handlers::forward)
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until ctrl-c
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every live tunnel is closed and given up to the close timeout to
    /// send its close frame.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let registry = self.registry();

        info!("Relay listening on {}", listener.local_addr()?);
        info!(
            "Tunnel clients connect to ws://{}{}",
            listener.local_addr()?,
            TUNNEL_PATH
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutting down relay");
                let closed = registry.shutdown_all();
                debug!("Closing {} tunnel(s)", closed);
            })
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        self.drain().await;
        Ok(())
    }

    /// Wait for closing tunnel connections to finish, up to the close timeout
    async fn drain(&self) {
        let tasks = &self.state.tunnel_tasks;
        tasks.close();
        if tokio::time::timeout(self.config.close_timeout, tasks.wait())
            .await
            .is_err()
        {
            warn!(
                "{} tunnel(s) still open after {:?}",
                tasks.len(),
                self.config.close_timeout
            );
        }
    }
}
