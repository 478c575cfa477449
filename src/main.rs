//! myrok - expose a private HTTP service through a public relay
//!
//! `myrok serve` runs the relay; `myrok connect` opens a tunnel from behind a
//! firewall and forwards relayed requests to a local service.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use myrok_client::{ClientConfig, LocalForwarder, TunnelClient};
use myrok_server::{RelayServer, ServerConfig};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "myrok")]
#[command(about = "Expose a private HTTP service through a public relay")]
#[command(version)]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the public relay
    Serve {
        /// Address to bind the HTTP listener to
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on
        #[arg(long, env = "PORT", default_value = "8080")]
        port: u16,

        /// Seconds to wait for a tunnel to answer a request
        #[arg(long, default_value = "10")]
        request_timeout_secs: u64,

        /// Seconds allowed for the close frame when a tunnel tears down
        #[arg(long, default_value = "3")]
        close_timeout_secs: u64,

        /// Largest request body forwarded down a tunnel
        #[arg(long, default_value = "10485760")]
        max_body_bytes: usize,
    },

    /// Open a tunnel and forward relayed requests to a local service
    Connect {
        /// Relay base URL (e.g., wss://relay.example.com)
        #[arg(long, env = "MYROK_SERVER")]
        server: String,

        /// Local service base URL (e.g., http://localhost:3000)
        #[arg(long, env = "MYROK_LOCAL")]
        local: String,

        /// Seconds to wait for the local service to answer
        #[arg(long, default_value = "30")]
        request_timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            request_timeout_secs,
            close_timeout_secs,
            max_body_bytes,
        } => {
            let config = ServerConfig {
                bind_addr: SocketAddr::new(host, port),
                request_timeout: Duration::from_secs(request_timeout_secs),
                close_timeout: Duration::from_secs(close_timeout_secs),
                max_body_bytes,
            };
            info!("Starting myrok relay on {}", config.bind_addr);

            RelayServer::new(config)
                .start()
                .await
                .context("Relay server failed")?;
        }
        Commands::Connect {
            server,
            local,
            request_timeout_secs,
        } => {
            let config = ClientConfig {
                server_url: server,
                local_url: local,
                upstream_timeout: Duration::from_secs(request_timeout_secs),
                ..Default::default()
            };

            let forwarder =
                LocalForwarder::new(config.local_url.clone(), config.upstream_timeout)
                    .context("Failed to build the local HTTP client")?;
            let client = TunnelClient::new(config);
            let tunnel = client
                .connect()
                .await
                .with_context(|| {
                    format!("Failed to open a tunnel to {}", client.config().server_url)
                })?;

            println!(
                "Forwarding {} -> {}",
                tunnel.public_url(),
                client.config().local_url
            );

            tunnel
                .run_until(forwarder, async {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received Ctrl+C, shutting down...");
                })
                .await
                .context("Tunnel failed")?;
        }
    }

    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
