//! # Hearth Main Application Entry Point
//!
//! The application can be launched with optional command-line arguments:
//!
//! - First argument: Port number (defaults to `settings.port` from the configuration)
//! - Second argument: Path to configuration file (defaults to "config.json5")
//!
//! ## Example Usage
//!
//! ```bash
//! # Run with the port from the configuration file
//! cargo run
//!
//! # Run on a specific port with a YAML configuration
//! cargo run 8080 /etc/hearth/config.yaml
//! ```
//!
//! Log levels can be controlled through the `RUST_LOG` environment variable.

use hearth::error::HearthError;
use hearth::server;
use std::env;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), HearthError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = env::args().nth(1).and_then(|s| s.parse().ok());
    let config_file_path = env::args().nth(2).map(PathBuf::from);

    tracing::info!("Starting Hearth {}", env!("CARGO_PKG_VERSION"));

    let cancel_token = CancellationToken::new();
    {
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown requested");
                    cancel_token.cancel();
                }
                Err(e) => tracing::error!("Unable to listen for shutdown signal: {e}"),
            }
        });
    }

    server::run(port, config_file_path, cancel_token).await?;

    tracing::info!("Hearth shutting down");
    Ok(())
}
