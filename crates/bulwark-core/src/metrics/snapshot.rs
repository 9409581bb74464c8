//! Structured export document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::health::{ErrorTrends, OverallHealth};
use super::record::{ErrorRecord, RecoveryStats};
use crate::error::ErrorKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Rolling average in seconds
    pub avg_response_time: f64,
    pub fallback_usage: u64,
}

/// Everything the metrics store exports
///
/// `health_summary` and `trends` are derived values; importing ignores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub export_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub error_history: Vec<ErrorRecord>,
    #[serde(default)]
    pub error_counts: BTreeMap<ErrorKind, u64>,
    #[serde(default)]
    pub recovery_stats: RecoveryStats,
    #[serde(default)]
    pub performance_stats: PerformanceStats,
    #[serde(default)]
    pub health_summary: OverallHealth,
    #[serde(default)]
    pub trends: ErrorTrends,
}
