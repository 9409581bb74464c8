//! Status, audit and advisory types produced by the recovery manager

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::dependency::DependencyId;
use crate::health::CheckerSnapshot;

/// One recovery attempt, as kept in the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub timestamp: DateTime<Utc>,
    pub dependency: DependencyId,
    pub success: bool,
    /// Retry count of the checker right after the attempt
    pub retry_count: u32,
    #[serde(default)]
    pub manual: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemHealth {
    /// Every registered dependency is healthy
    Healthy,
    /// At least 80% are healthy
    Degraded,
    Critical,
    /// Nothing registered
    Unknown,
}

impl SystemHealth {
    pub fn assess(healthy: usize, total: usize) -> Self {
        if total == 0 {
            SystemHealth::Unknown
        } else if healthy == total {
            SystemHealth::Healthy
        } else if healthy * 5 >= total * 4 {
            SystemHealth::Degraded
        } else {
            SystemHealth::Critical
        }
    }
}

impl fmt::Display for SystemHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemHealth::Healthy => write!(f, "healthy"),
            SystemHealth::Degraded => write!(f, "degraded"),
            SystemHealth::Critical => write!(f, "critical"),
            SystemHealth::Unknown => write!(f, "unknown"),
        }
    }
}

/// Whole-system view across all registered dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub overall_health: SystemHealth,
    pub monitoring_enabled: bool,
    pub maintenance_mode: bool,
    pub auto_recovery_enabled: bool,
    pub total_services: usize,
    pub healthy_services: usize,
    pub active_recoveries: usize,
    /// Recovery attempts in the last hour
    pub recent_recoveries: usize,
    /// Success share of `recent_recoveries`, 1.0 when there were none
    pub recovery_success_rate: f64,
    pub services: BTreeMap<DependencyId, CheckerSnapshot>,
}

/// Document written by `export_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusExport {
    pub export_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub status: SystemStatus,
    /// Most recent records, oldest first
    pub recovery_history: Vec<RecoveryRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    ManualIntervention,
    EnableService,
    ExitMaintenance,
    EnableMonitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Medium,
    High,
}

/// Advisory only; nothing acts on these automatically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    /// `None` for system-wide advice
    pub dependency: Option<DependencyId>,
    pub priority: Priority,
    pub message: String,
}

impl Recommendation {
    pub(crate) fn manual_intervention(dependency: &DependencyId) -> Self {
        Self {
            kind: RecommendationKind::ManualIntervention,
            dependency: Some(dependency.clone()),
            priority: Priority::High,
            message: format!(
                "Service {dependency} has exhausted auto-recovery attempts. Manual intervention required."
            ),
        }
    }

    pub(crate) fn enable_service(dependency: &DependencyId) -> Self {
        Self {
            kind: RecommendationKind::EnableService,
            dependency: Some(dependency.clone()),
            priority: Priority::Medium,
            message: format!("Service {dependency} is disabled. Enable to restore functionality."),
        }
    }

    pub(crate) fn exit_maintenance() -> Self {
        Self {
            kind: RecommendationKind::ExitMaintenance,
            dependency: None,
            priority: Priority::Medium,
            message: "System is in maintenance mode. Exit to enable auto-recovery.".to_string(),
        }
    }

    pub(crate) fn enable_monitoring() -> Self {
        Self {
            kind: RecommendationKind::EnableMonitoring,
            dependency: None,
            priority: Priority::High,
            message: "Service monitoring is disabled. Enable for automatic health checks."
                .to_string(),
        }
    }
}

/// What one monitoring cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// The cycle was skipped because of maintenance mode
    pub skipped: bool,
    /// Dependencies probed this cycle
    pub checked: Vec<DependencyId>,
    /// Probed and found unhealthy; their breakers were forced open
    pub failed: Vec<DependencyId>,
    /// Recovery workers started this cycle
    pub launched: Vec<DependencyId>,
}
