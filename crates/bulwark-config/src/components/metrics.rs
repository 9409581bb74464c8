//! Error metrics store configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Retention limits and persistence location for the error metrics store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsComponentConfig {
    /// Capacity of the error history ring buffer; oldest records are evicted
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Rolling window kept for per-dependency error lists
    #[serde(default = "default_history_window")]
    pub history_window_seconds: u64,
    /// Number of response time samples kept for the rolling average
    #[serde(default = "default_response_time_samples")]
    pub response_time_samples: usize,
    /// Where `export_metrics` writes when no explicit path is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,
}

fn default_max_history() -> usize { 1000 }
fn default_history_window() -> u64 { 3600 }
fn default_response_time_samples() -> usize { 100 }

impl MetricsComponentConfig {
    /// Per-dependency window as a [`Duration`]
    pub fn history_window(&self) -> Duration {
        Duration::from_secs(self.history_window_seconds)
    }

    /// Configured export path, falling back to `~/.bulwark/error_metrics.json`
    pub fn resolved_export_path(&self) -> PathBuf {
        self.export_path
            .clone()
            .unwrap_or_else(|| crate::bulwark_home().join("error_metrics.json"))
    }
}

impl Default for MetricsComponentConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            history_window_seconds: default_history_window(),
            response_time_samples: default_response_time_samples(),
            export_path: None,
        }
    }
}
