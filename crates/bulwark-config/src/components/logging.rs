//! Logging configuration

use serde::{Deserialize, Serialize};

/// Logging configuration consumed by `bulwark_core::logging::init_logging`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (`RUST_LOG` overrides it when set)
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

/// Output format of the fmt subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogFormat {
    /// Structured JSON lines
    #[serde(rename = "json")]
    Json,
    /// Compact single-line text
    #[serde(rename = "text")]
    #[default]
    Text,
    /// Multi-line human-readable output
    #[serde(rename = "pretty")]
    Pretty,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Text,
        }
    }
}
