//! Chat Room Server - Entry Point
//!
//! Loads configuration, binds the TCP listener and serves connections.

use std::env;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chatroom_server::{serve, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chatroom_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chatroom_server=info")),
        )
        .init();

    // Optional TOML file from CHATROOM_CONFIG; first argument overrides the address
    let mut config = Config::from_env()?;
    if let Some(addr) = env::args().nth(1) {
        config.bind_addr = addr;
    }

    // Start TCP listener
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Chat Room Server listening on {}", config.bind_addr);

    serve(listener, config).await;
    Ok(())
}
