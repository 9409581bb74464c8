//! Circuit breaker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Defaults applied to every breaker the registry creates lazily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerComponentConfig {
    /// Consecutive failures before the breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Cooldown after the last failure before a half-open trial is allowed
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_seconds: u64,
}

fn default_failure_threshold() -> u32 { 3 }
fn default_recovery_timeout() -> u64 { 60 }

impl BreakerComponentConfig {
    /// Cooldown as a [`Duration`]
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_seconds)
    }
}

impl Default for BreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_seconds: default_recovery_timeout(),
        }
    }
}
