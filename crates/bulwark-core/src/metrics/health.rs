//! Health classification and report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::dependency::DependencyId;
use crate::error::ErrorKind;

/// Four-tier health classification, plus `Unknown` before the first evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
    #[default]
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Critical => write!(f, "critical"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify from errors per minute and uptime percentage.
pub fn classify(error_rate: f64, uptime_percentage: f64) -> HealthStatus {
    if error_rate == 0.0 && uptime_percentage > 99.0 {
        HealthStatus::Healthy
    } else if error_rate < 0.1 && uptime_percentage > 95.0 {
        HealthStatus::Degraded
    } else if error_rate < 0.5 && uptime_percentage > 80.0 {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Critical
    }
}

/// Health of one dependency over the last hour / day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealthReport {
    pub dependency: DependencyId,
    pub status: HealthStatus,
    /// Errors per minute over the last hour
    pub error_rate: f64,
    pub recent_errors: usize,
    pub uptime_percentage: f64,
    pub total_downtime_24h_seconds: f64,
    pub last_error: Option<DateTime<Utc>>,
}

/// Whole-system health over the last hour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallHealth {
    pub overall_health: HealthStatus,
    pub error_rate_per_minute: f64,
    pub recent_errors_1h: usize,
    /// Rolling average in seconds
    pub average_response_time: f64,
    pub fallback_usage_count: u64,
    pub recovery_success_rate: f64,
    pub recovery_attempts: u64,
    pub successful_recoveries: u64,
    pub last_health_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    #[default]
    Stable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorKindCount {
    pub kind: ErrorKind,
    pub count: u64,
}

/// Error volume summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorTrends {
    pub errors_last_hour: usize,
    pub errors_last_day: usize,
    /// Increasing when the last hour is above the hourly average of the last day
    pub trend: Trend,
    /// Up to five most frequent kinds in the last hour
    pub top_error_types: Vec<ErrorKindCount>,
    /// Uptime percentage per dependency with recorded errors
    pub service_reliability: BTreeMap<DependencyId, f64>,
    pub analysis_timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_tiers() {
        assert_eq!(classify(0.0, 100.0), HealthStatus::Healthy);
        assert_eq!(classify(0.0, 99.0), HealthStatus::Degraded);
        assert_eq!(classify(0.05, 100.0), HealthStatus::Degraded);
        assert_eq!(classify(0.1, 100.0), HealthStatus::Unhealthy);
        assert_eq!(classify(0.0, 90.0), HealthStatus::Unhealthy);
        assert_eq!(classify(0.5, 100.0), HealthStatus::Critical);
        assert_eq!(classify(0.0, 80.0), HealthStatus::Critical);
    }
}
