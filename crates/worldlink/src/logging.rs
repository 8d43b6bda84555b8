//! Tracing subscriber setup for the binary.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::WorldlinkError;
use crate::config::LoggingConfig;

/// Installs the global subscriber.
///
/// `RUST_LOG`, when set, overrides `config.level`. With `config.json`
/// every event is written as one JSON object per line.
pub fn init(config: &LoggingConfig) -> Result<(), WorldlinkError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_names(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_names(true),
            )
            .try_init()
    };
    result.map_err(|e| WorldlinkError::Logging(e.to_string()))?;

    tracing::info!(level = %config.level, json = config.json, "logging initialized");
    Ok(())
}
