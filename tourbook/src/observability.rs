//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Initialize JSON tracing output filtered by the configured log level
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.service.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding) keeps the existing subscriber
    if tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }

    tracing::info!(
        service = %config.service.name,
        environment = ?config.service.environment,
        "Tracing initialized"
    );

    Ok(())
}

/// Flush pending log output before exit
pub fn shutdown_tracing() {
    tracing::info!("Tracing shutdown complete");
}
