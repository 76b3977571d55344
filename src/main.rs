//! Line Relay Server - Entry Point
//!
//! Parses configuration, binds the listener and runs the supervisor until
//! Ctrl-C.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use line_relay::{Config, Supervisor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let supervisor = Supervisor::bind(&config).await?;
    info!("Line relay listening on {}", supervisor.local_addr()?);

    supervisor.run_until_ctrl_c().await?;

    info!("Line relay stopped");
    Ok(())
}
