//! Deadline and retry configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Deadline budgets, including the adaptive deadline bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineComponentConfig {
    /// Deadline used when no history is available, and the adaptive floor
    #[serde(default = "default_base_timeout")]
    pub base_timeout_seconds: u64,
    /// Upper bound for adaptive deadlines
    #[serde(default = "default_max_timeout")]
    pub max_timeout_seconds: u64,
    /// Number of successful durations the adaptive deadline averages over
    #[serde(default = "default_adaptive_history")]
    pub adaptive_history: usize,
    /// Retry-on-expiry policy
    #[serde(default)]
    pub retry: RetryComponentConfig,
}

/// Retry budget for operations that exceed their deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryComponentConfig {
    /// Additional attempts after the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_timeout() -> u64 { 30 }
fn default_max_timeout() -> u64 { 120 }
fn default_adaptive_history() -> usize { 10 }
fn default_max_retries() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 60_000 }

impl DeadlineComponentConfig {
    /// Base deadline as a [`Duration`]
    pub fn base_timeout(&self) -> Duration {
        Duration::from_secs(self.base_timeout_seconds)
    }

    /// Maximum adaptive deadline as a [`Duration`]
    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout_seconds)
    }
}

impl RetryComponentConfig {
    /// Base backoff delay as a [`Duration`]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Backoff ceiling as a [`Duration`]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for DeadlineComponentConfig {
    fn default() -> Self {
        Self {
            base_timeout_seconds: default_base_timeout(),
            max_timeout_seconds: default_max_timeout(),
            adaptive_history: default_adaptive_history(),
            retry: RetryComponentConfig::default(),
        }
    }
}

impl Default for RetryComponentConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}
