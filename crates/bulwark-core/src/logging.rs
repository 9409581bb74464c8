//! Tracing subscriber setup

use bulwark_config::{LogFormat, LoggingConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::error::{ResilienceError, Result};

/// Filter directive for the bulwark crates at the configured level
pub fn build_filter_string(config: &LoggingConfig) -> String {
    let level = config.level.trim();
    // A full directive (`bulwark_core=debug,hyper=warn`) is used as given
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    format!("bulwark_core={level},bulwark_config={level}")
}

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over the configured level when set. Calling
/// this again after a subscriber is installed is a no-op.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(build_filter_string(config)).map_err(|e| {
            ResilienceError::Configuration(format!("invalid log level '{}': {e}", config.level))
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Text => builder.compact().try_init(),
    };

    if installed.is_err() {
        debug!("Global subscriber already installed, keeping it");
    }
    Ok(())
}
