//! # Parlor Server
//!
//! Realtime chat server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! parlor
//!
//! # Run with a config file
//! PARLOR_CONFIG=/path/to/parlor.toml parlor
//!
//! # Run with environment variables
//! PARLOR_PORT=8080 PARLOR_HOST=0.0.0.0 parlor
//! ```

use anyhow::Result;
use parlor_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parlor=debug,parlor_server=debug,parlor_core=debug,parlor_transport=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;

    tracing::info!("Starting Parlor server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
