//! tracing-subscriber setup

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level; `level_override` (from the
/// command line) wins over both.
pub fn init(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let filter = match level_override {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if config.json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow!("Failed to install JSON log subscriber: {}", e))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
    }
}
