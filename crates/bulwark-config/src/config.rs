//! Root configuration document

use crate::components::{
    BreakerComponentConfig, DeadlineComponentConfig, LoggingConfig, MetricsComponentConfig,
    RecoveryComponentConfig,
};
use crate::loader::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete configuration for one resilience context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Circuit breaker defaults
    #[serde(default)]
    pub breaker: BreakerComponentConfig,
    /// Error metrics retention
    #[serde(default)]
    pub metrics: MetricsComponentConfig,
    /// Deadline and retry budgets
    #[serde(default)]
    pub deadline: DeadlineComponentConfig,
    /// Recovery manager scheduling
    #[serde(default)]
    pub recovery: RecoveryComponentConfig,
    /// Logging setup
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ResilienceConfig {
    /// Reject values that would make a component unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.metrics.max_history == 0 {
            return Err(ConfigError::Validation(
                "metrics.max_history must be at least 1".to_string(),
            ));
        }
        if self.metrics.response_time_samples == 0 {
            return Err(ConfigError::Validation(
                "metrics.response_time_samples must be at least 1".to_string(),
            ));
        }
        if self.deadline.base_timeout_seconds > self.deadline.max_timeout_seconds {
            return Err(ConfigError::Validation(format!(
                "deadline.base_timeout_seconds ({}) exceeds deadline.max_timeout_seconds ({})",
                self.deadline.base_timeout_seconds, self.deadline.max_timeout_seconds
            )));
        }
        if self.deadline.adaptive_history == 0 {
            return Err(ConfigError::Validation(
                "deadline.adaptive_history must be at least 1".to_string(),
            ));
        }
        if self.deadline.retry.base_delay_ms > self.deadline.retry.max_delay_ms {
            return Err(ConfigError::Validation(
                "deadline.retry.base_delay_ms exceeds deadline.retry.max_delay_ms".to_string(),
            ));
        }
        if self.recovery.max_concurrent_recoveries == 0 {
            return Err(ConfigError::Validation(
                "recovery.max_concurrent_recoveries must be at least 1".to_string(),
            ));
        }
        if self.recovery.check_interval_seconds == 0 {
            return Err(ConfigError::Validation(
                "recovery.check_interval_seconds must be at least 1".to_string(),
            ));
        }
        let policy = &self.recovery.default_policy;
        if policy.base_delay_seconds > policy.max_delay_seconds {
            return Err(ConfigError::Validation(
                "recovery.default_policy.base_delay_seconds exceeds max_delay_seconds".to_string(),
            ));
        }
        Ok(())
    }
}

/// Directory for default export locations (`~/.bulwark`, or `./.bulwark` without a home)
pub fn bulwark_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bulwark")
}
