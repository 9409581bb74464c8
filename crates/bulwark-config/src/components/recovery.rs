//! Recovery manager and per-service policy configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How a failed dependency schedules its next automatic recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Retry with no delay
    Immediate,
    /// `base_delay * 2^n`, capped at `max_delay`
    #[default]
    ExponentialBackoff,
    /// Fixed `base_delay` between attempts
    Scheduled,
    /// Never scheduled automatically; recovery is triggered externally
    Manual,
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryStrategy::Immediate => write!(f, "immediate"),
            RecoveryStrategy::ExponentialBackoff => write!(f, "exponential_backoff"),
            RecoveryStrategy::Scheduled => write!(f, "scheduled"),
            RecoveryStrategy::Manual => write!(f, "manual"),
        }
    }
}

/// Recovery policy for a single monitored dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePolicyConfig {
    /// Backoff strategy between recovery attempts
    #[serde(default)]
    pub strategy: RecoveryStrategy,
    /// Automatic attempts before manual intervention is required
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: u64,
    /// Backoff ceiling
    #[serde(default = "default_max_delay")]
    pub max_delay_seconds: u64,
    /// Minimum time between two health probes of this dependency
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
    /// Disabled dependencies are never probed and report maintenance
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Recovery manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryComponentConfig {
    /// Wake-up interval of the monitoring loop
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// Ceiling on concurrently running recovery workers
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_recoveries: usize,
    /// How long recovery records are kept
    #[serde(default = "default_history_retention")]
    pub history_retention_seconds: u64,
    /// Where `export_status` writes when no explicit path is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_export_path: Option<PathBuf>,
    /// Policy used by services registered without one
    #[serde(default)]
    pub default_policy: ServicePolicyConfig,
}

fn default_true() -> bool { true }
fn default_max_retries() -> u32 { 3 }
fn default_base_delay() -> u64 { 60 }
fn default_max_delay() -> u64 { 900 }
fn default_health_check_interval() -> u64 { 300 }
fn default_check_interval() -> u64 { 60 }
fn default_max_concurrent() -> usize { 2 }
fn default_history_retention() -> u64 { 86_400 }

impl ServicePolicyConfig {
    /// Base backoff delay as a [`Duration`]
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_seconds)
    }

    /// Backoff ceiling as a [`Duration`]
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_seconds)
    }

    /// Probe interval as a [`Duration`]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }
}

impl RecoveryComponentConfig {
    /// Monitoring loop interval as a [`Duration`]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// Recovery record retention as a [`Duration`]
    pub fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_retention_seconds)
    }

    /// Configured status export path, falling back to `~/.bulwark/recovery_status.json`
    pub fn resolved_status_export_path(&self) -> PathBuf {
        self.status_export_path
            .clone()
            .unwrap_or_else(|| crate::bulwark_home().join("recovery_status.json"))
    }
}

impl Default for ServicePolicyConfig {
    fn default() -> Self {
        Self {
            strategy: RecoveryStrategy::default(),
            max_retries: default_max_retries(),
            base_delay_seconds: default_base_delay(),
            max_delay_seconds: default_max_delay(),
            health_check_interval_seconds: default_health_check_interval(),
            enabled: true,
        }
    }
}

impl Default for RecoveryComponentConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            max_concurrent_recoveries: default_max_concurrent(),
            history_retention_seconds: default_history_retention(),
            status_export_path: None,
            default_policy: ServicePolicyConfig::default(),
        }
    }
}
