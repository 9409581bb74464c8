//! Loading configuration documents from disk or strings

use crate::config::ResilienceConfig;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document could not be parsed
    #[error("Parse error ({format}): {message}")]
    Parse {
        /// Format that was being parsed
        format: &'static str,
        /// Parser message
        message: String,
    },

    /// The file extension is not a supported format
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// The document parsed but holds unusable values
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Loads [`ResilienceConfig`] documents.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate a config file; the format follows the file extension.
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<ResilienceConfig, ConfigError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        debug!(path = %path.display(), format = %extension, "Loading resilience config");

        match extension.as_str() {
            "toml" => Self::from_toml_str(&contents),
            "json" => Self::from_json_str(&contents),
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Self::from_yaml_str(&contents),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<ResilienceConfig, ConfigError> {
        let config: ResilienceConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            format: "toml",
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(contents: &str) -> Result<ResilienceConfig, ConfigError> {
        let config: ResilienceConfig =
            serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "json",
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML document
    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(contents: &str) -> Result<ResilienceConfig, ConfigError> {
        let config: ResilienceConfig =
            serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "yaml",
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }
}
