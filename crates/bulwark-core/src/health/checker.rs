//! Per-dependency health and recovery state machine

use bulwark_config::{RecoveryStrategy, ServicePolicyConfig};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::probe::{HealthProbe, RecoveryAction, ServiceConfig};
use super::ServiceStatus;
use crate::clock::{to_chrono, SharedClock};
use crate::dependency::DependencyId;
use crate::error::{ErrorKind, Severity};
use crate::metrics::{ErrorEvent, ErrorMetrics};

/// Delay before the next automatic recovery attempt
///
/// `attempts_before` is the number of recovery attempts already made, so the
/// first scheduled retry uses `base_delay`. `None` for the manual strategy.
pub fn retry_delay(policy: &ServicePolicyConfig, attempts_before: u32) -> Option<Duration> {
    match policy.strategy {
        RecoveryStrategy::Immediate => Some(Duration::ZERO),
        RecoveryStrategy::ExponentialBackoff => {
            let factor = 2u32.checked_pow(attempts_before).unwrap_or(u32::MAX);
            let delay = policy
                .base_delay()
                .checked_mul(factor)
                .unwrap_or_else(|| policy.max_delay());
            Some(delay.min(policy.max_delay()))
        }
        RecoveryStrategy::Scheduled => Some(policy.base_delay()),
        RecoveryStrategy::Manual => None,
    }
}

/// Result of one recovery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// The action succeeded; the dependency is healthy again
    Recovered,
    /// The action ran and failed or raised
    Failed,
    /// Not attempted: retries exhausted, not yet due, or already recovering
    Refused,
}

impl RecoveryOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered)
    }
}

/// Status report for one checker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerSnapshot {
    pub dependency: DependencyId,
    /// `Maintenance` while disabled
    pub status: ServiceStatus,
    pub strategy: RecoveryStrategy,
    pub enabled: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct CheckerState {
    status: ServiceStatus,
    enabled: bool,
    last_check: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    retry_count: u32,
    next_retry: Option<DateTime<Utc>>,
    failed_since: Option<DateTime<Utc>>,
}

/// Health probe plus recovery action for one dependency, with its own
/// retry schedule
pub struct ServiceHealthChecker {
    name: DependencyId,
    probe: Arc<dyn HealthProbe>,
    recovery: Arc<dyn RecoveryAction>,
    policy: ServicePolicyConfig,
    state: Mutex<CheckerState>,
    metrics: Arc<ErrorMetrics>,
    clock: SharedClock,
}

impl std::fmt::Debug for ServiceHealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHealthChecker")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl ServiceHealthChecker {
    pub fn new(config: ServiceConfig, metrics: Arc<ErrorMetrics>, clock: SharedClock) -> Self {
        let enabled = config.policy.enabled;
        Self {
            name: config.name,
            probe: config.probe,
            recovery: config.recovery,
            policy: config.policy,
            state: Mutex::new(CheckerState {
                status: ServiceStatus::Healthy,
                enabled,
                last_check: None,
                last_failure: None,
                retry_count: 0,
                next_retry: None,
                failed_since: None,
            }),
            metrics,
            clock,
        }
    }

    pub fn name(&self) -> &DependencyId {
        &self.name
    }

    pub fn policy(&self) -> &ServicePolicyConfig {
        &self.policy
    }

    /// Internal status, ignoring the enabled flag
    pub fn status(&self) -> ServiceStatus {
        self.state.lock().status
    }

    /// Status as reported to callers: `Maintenance` while disabled
    pub fn reported_status(&self) -> ServiceStatus {
        let state = self.state.lock();
        if state.enabled {
            state.status
        } else {
            ServiceStatus::Maintenance
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn enable(&self) {
        self.state.lock().enabled = true;
        info!(dependency = %self.name, "Service enabled");
    }

    pub fn disable(&self) {
        self.state.lock().enabled = false;
        info!(dependency = %self.name, "Service disabled");
    }

    pub fn retry_count(&self) -> u32 {
        self.state.lock().retry_count
    }

    pub fn next_retry(&self) -> Option<DateTime<Utc>> {
        self.state.lock().next_retry
    }

    /// True once automatic retries are used up
    pub fn retries_exhausted(&self) -> bool {
        self.state.lock().retry_count >= self.policy.max_retries
    }

    /// Whether the per-dependency probe interval has elapsed
    pub fn is_due_for_check(&self) -> bool {
        let now = self.clock.now();
        self.state
            .lock()
            .last_check
            .map_or(true, |t| now - t >= to_chrono(self.policy.health_check_interval()))
    }

    /// Whether an automatic recovery attempt would be accepted right now
    pub fn ready_for_recovery(&self) -> bool {
        if self.policy.strategy == RecoveryStrategy::Manual {
            return false;
        }
        let now = self.clock.now();
        let state = self.state.lock();
        state.enabled
            && state.status == ServiceStatus::Failed
            && state.retry_count < self.policy.max_retries
            && state.next_retry.map_or(true, |t| now >= t)
    }

    /// Probe the dependency and update the status
    ///
    /// Disabled checkers report healthy without probing.
    pub async fn check_health(&self) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let checked_at = self.clock.now();
        self.state.lock().last_check = Some(checked_at);

        let healthy = match self.probe.check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(dependency = %self.name, error = %e, "Health probe raised");
                self.metrics.record_error(
                    ErrorEvent::new(ErrorKind::ProbeFailure, format!("{e:#}"))
                        .severity(Severity::High)
                        .dependency(&self.name)
                        .context("operation", "health_check"),
                );
                false
            }
        };

        if healthy {
            self.on_healthy();
        } else {
            self.on_failure();
        }
        healthy
    }

    /// Run the recovery action if retries remain and the next retry is due
    pub async fn attempt_recovery(&self) -> RecoveryOutcome {
        self.attempt(false).await
    }

    /// Run the recovery action regardless of the retry schedule
    ///
    /// If the attempt does not recover the dependency, the retry count and
    /// next retry time go back to what they were, so a manual attempt never
    /// eats into the automatic budget.
    pub async fn attempt_recovery_out_of_schedule(&self) -> RecoveryOutcome {
        self.attempt(true).await
    }

    async fn attempt(&self, forced: bool) -> RecoveryOutcome {
        let now = self.clock.now();
        let (attempt, saved) = {
            let mut state = self.state.lock();
            if state.status == ServiceStatus::Recovering {
                return RecoveryOutcome::Refused;
            }
            if !forced {
                if state.retry_count >= self.policy.max_retries {
                    debug!(dependency = %self.name, "Recovery refused, retries exhausted");
                    return RecoveryOutcome::Refused;
                }
                if state.next_retry.is_some_and(|t| now < t) {
                    debug!(dependency = %self.name, "Recovery refused, next retry not due");
                    return RecoveryOutcome::Refused;
                }
            }
            let saved = (state.retry_count, state.next_retry);
            state.status = ServiceStatus::Recovering;
            state.retry_count += 1;
            (state.retry_count, saved)
        };

        info!(dependency = %self.name, attempt, forced, "Attempting recovery");

        let recovered = match self.recovery.recover().await {
            Ok(recovered) => recovered,
            Err(e) => {
                warn!(dependency = %self.name, error = %e, "Recovery action raised");
                self.metrics.record_error(
                    ErrorEvent::new(ErrorKind::RecoveryFailure, format!("{e:#}"))
                        .severity(Severity::High)
                        .dependency(&self.name)
                        .context("operation", "recovery_attempt"),
                );
                false
            }
        };

        if recovered {
            self.on_healthy();
            self.metrics.record_recovery_attempt(&self.name, true);
            info!(dependency = %self.name, attempt, "Recovery succeeded");
            return RecoveryOutcome::Recovered;
        }

        {
            let now = self.clock.now();
            let mut state = self.state.lock();
            state.status = ServiceStatus::Failed;
            // Attempts can start from Healthy (manual, or a probe raced the worker)
            state.failed_since.get_or_insert(now);
            if forced {
                (state.retry_count, state.next_retry) = saved;
            } else {
                state.next_retry =
                    retry_delay(&self.policy, attempt - 1).map(|delay| now + to_chrono(delay));
            }
        }
        self.metrics.record_recovery_attempt(&self.name, false);
        warn!(dependency = %self.name, attempt, "Recovery failed");
        RecoveryOutcome::Failed
    }

    fn on_failure(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.last_failure = Some(now);

        if !matches!(state.status, ServiceStatus::Failed | ServiceStatus::Recovering) {
            state.status = ServiceStatus::Failed;
            state.failed_since = Some(now);
            state.next_retry =
                retry_delay(&self.policy, state.retry_count).map(|delay| now + to_chrono(delay));
            warn!(
                dependency = %self.name,
                next_retry = ?state.next_retry,
                "Dependency failed health check"
            );
        }
    }

    fn on_healthy(&self) {
        let now = self.clock.now();
        let downtime_start = {
            let mut state = self.state.lock();
            let was_failing =
                matches!(state.status, ServiceStatus::Failed | ServiceStatus::Recovering);
            state.status = ServiceStatus::Healthy;
            if was_failing {
                state.retry_count = 0;
                state.next_retry = None;
                info!(dependency = %self.name, "Dependency healthy again");
            }
            state.failed_since.take()
        };

        if let Some(start) = downtime_start {
            self.metrics.record_downtime(&self.name, start, now);
        }
    }

    pub fn snapshot(&self) -> CheckerSnapshot {
        let state = self.state.lock();
        CheckerSnapshot {
            dependency: self.name.clone(),
            status: if state.enabled {
                state.status
            } else {
                ServiceStatus::Maintenance
            },
            strategy: self.policy.strategy,
            enabled: state.enabled,
            last_check: state.last_check,
            last_failure: state.last_failure,
            retry_count: state.retry_count,
            max_retries: self.policy.max_retries,
            next_retry: state.next_retry,
        }
    }
}
