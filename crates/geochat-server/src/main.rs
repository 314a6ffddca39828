//! # GeoChat Server
//!
//! Location-partitioned realtime chat server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! geochat
//!
//! # Run with custom config
//! geochat --config /path/to/geochat.toml
//!
//! # Run with environment variables
//! GEOCHAT_PORT=8080 GEOCHAT_HOST=0.0.0.0 geochat
//! ```

use anyhow::Result;
use clap::Parser;
use geochat_server::{config::Cli, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geochat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Cli::parse().load_config()?;

    tracing::info!("Starting GeoChat server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
