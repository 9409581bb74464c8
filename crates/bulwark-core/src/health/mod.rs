//! Service Health Checker
//!
//! Wraps one monitored dependency's health probe and recovery action with a
//! retry schedule of its own, independent of any circuit breaker cooldown.
//!
//! ```text
//! Healthy ──probe fails──▶ Failed ──attempt──▶ Recovering ──ok──▶ Healthy
//!    ▲                       ▲  │                   │
//!    └──────probe ok─────────┼──┘                   │
//!                            └──────action fails────┘
//! ```
//!
//! Maintenance is reported for disabled checkers and is orthogonal to the
//! states above.

mod checker;
mod probe;

pub use checker::{retry_delay, CheckerSnapshot, RecoveryOutcome, ServiceHealthChecker};
pub use probe::{HealthProbe, RecoveryAction, ServiceConfig};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Failed,
    Recovering,
    Maintenance,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Healthy => write!(f, "healthy"),
            ServiceStatus::Degraded => write!(f, "degraded"),
            ServiceStatus::Failed => write!(f, "failed"),
            ServiceStatus::Recovering => write!(f, "recovering"),
            ServiceStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}
