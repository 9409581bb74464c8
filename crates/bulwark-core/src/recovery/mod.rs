//! Recovery Manager
//!
//! Reconciles every registered [`ServiceHealthChecker`] against the
//! [`BreakerRegistry`]. A background loop wakes on a fixed interval, probes
//! the dependencies whose own probe interval has elapsed, forces the breaker
//! of anything unhealthy open, and starts recovery workers for failed
//! dependencies whose retry is due.
//!
//! Workers are spawned, never awaited by the loop. At most
//! `max_concurrent_recoveries` run at once, and never two for the same
//! dependency. A successful recovery resets that dependency's breaker.
//!
//! Probe and recovery failures are recorded in the metrics store and never
//! surface to callers of the manager.

mod report;

pub use report::{
    PollReport, Priority, Recommendation, RecommendationKind, RecoveryRecord, StatusExport,
    SystemHealth, SystemStatus,
};

use bulwark_config::{RecoveryComponentConfig, ServicePolicyConfig};
use chrono::Duration as ChronoDuration;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::breaker::BreakerRegistry;
use crate::clock::{to_chrono, SharedClock};
use crate::dependency::DependencyId;
use crate::error::{ResilienceError, Result, Severity};
use crate::health::{RecoveryOutcome, ServiceConfig, ServiceHealthChecker, ServiceStatus};
use crate::metrics::{write_json, ErrorEvent, ErrorMetrics};

/// Records kept in a status export
const EXPORTED_HISTORY: usize = 50;
/// Window for the recent-recovery figures in [`SystemStatus`]
const RECENT_RECOVERY_WINDOW: ChronoDuration = ChronoDuration::hours(1);
/// How long `stop_monitoring` waits for the loop to finish its cycle
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    config: RecoveryComponentConfig,
    checkers: DashMap<DependencyId, Arc<ServiceHealthChecker>>,
    breakers: Arc<BreakerRegistry>,
    metrics: Arc<ErrorMetrics>,
    clock: SharedClock,
    permits: Arc<Semaphore>,
    active: Mutex<HashSet<DependencyId>>,
    workers: TaskTracker,
    history: Mutex<VecDeque<RecoveryRecord>>,
    maintenance_mode: AtomicBool,
    auto_recovery: AtomicBool,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}

/// Marks a dependency as having a recovery in flight until dropped
struct ActiveRecovery {
    shared: Arc<Shared>,
    dependency: DependencyId,
}

impl ActiveRecovery {
    /// Atomically claim `dependency`; `None` if a recovery is already running
    fn claim(shared: &Arc<Shared>, dependency: &DependencyId) -> Option<Self> {
        if !shared.active.lock().insert(dependency.clone()) {
            return None;
        }
        Some(Self {
            shared: shared.clone(),
            dependency: dependency.clone(),
        })
    }
}

impl Drop for ActiveRecovery {
    fn drop(&mut self) {
        self.shared.active.lock().remove(&self.dependency);
    }
}

/// Orchestrates health checks and bounded concurrent recovery
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct RecoveryManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("services", &self.shared.checkers.len())
            .field("active_recoveries", &self.active_recoveries())
            .field("maintenance_mode", &self.is_maintenance_mode())
            .field("monitoring", &self.is_monitoring())
            .finish()
    }
}

impl RecoveryManager {
    pub fn new(
        config: RecoveryComponentConfig,
        metrics: Arc<ErrorMetrics>,
        breakers: Arc<BreakerRegistry>,
        clock: SharedClock,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_recoveries.max(1)));
        Self {
            shared: Arc::new(Shared {
                config,
                checkers: DashMap::new(),
                breakers,
                metrics,
                clock,
                permits,
                active: Mutex::new(HashSet::new()),
                workers: TaskTracker::new(),
                history: Mutex::new(VecDeque::new()),
                maintenance_mode: AtomicBool::new(false),
                auto_recovery: AtomicBool::new(true),
                monitor: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RecoveryComponentConfig {
        &self.shared.config
    }

    /// Policy for services registered without one of their own
    pub fn default_policy(&self) -> &ServicePolicyConfig {
        &self.shared.config.default_policy
    }

    /// Start monitoring a dependency; re-registering replaces the old checker
    ///
    /// The dependency's breaker is created now, so forcing it open later
    /// always has something to act on.
    pub fn register(&self, service: ServiceConfig) -> DependencyId {
        let name = service.name.clone();
        let checker = ServiceHealthChecker::new(
            service,
            self.shared.metrics.clone(),
            self.shared.clock.clone(),
        );
        self.shared.breakers.get_or_create(&name);

        if self
            .shared
            .checkers
            .insert(name.clone(), Arc::new(checker))
            .is_some()
        {
            info!(dependency = %name, "Replaced registered service");
        } else {
            info!(dependency = %name, "Registered service");
        }
        name
    }

    /// Stop monitoring a dependency; its breaker stays in the registry
    pub fn unregister(&self, dependency: &DependencyId) -> bool {
        let removed = self.shared.checkers.remove(dependency).is_some();
        if removed {
            info!(dependency = %dependency, "Unregistered service");
        }
        removed
    }

    pub fn checker(&self, dependency: &DependencyId) -> Option<Arc<ServiceHealthChecker>> {
        self.shared.checkers.get(dependency).map(|c| c.value().clone())
    }

    fn require_checker(&self, dependency: &DependencyId) -> Result<Arc<ServiceHealthChecker>> {
        self.checker(dependency)
            .ok_or_else(|| ResilienceError::UnknownDependency(dependency.clone()))
    }

    /// Registered dependencies, sorted
    pub fn dependencies(&self) -> Vec<DependencyId> {
        let mut names: Vec<DependencyId> =
            self.shared.checkers.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    /// Checkers sorted by name, cloned out of the map so no guard is held
    fn sorted_checkers(&self) -> Vec<Arc<ServiceHealthChecker>> {
        let mut checkers: Vec<Arc<ServiceHealthChecker>> =
            self.shared.checkers.iter().map(|c| c.value().clone()).collect();
        checkers.sort_by(|a, b| a.name().cmp(b.name()));
        checkers
    }

    pub fn enable_service(&self, dependency: &DependencyId) -> Result<()> {
        self.require_checker(dependency)?.enable();
        Ok(())
    }

    pub fn disable_service(&self, dependency: &DependencyId) -> Result<()> {
        self.require_checker(dependency)?.disable();
        Ok(())
    }

    /// Skip monitoring cycles and stop automatic recovery
    pub fn enter_maintenance_mode(&self) {
        self.shared.maintenance_mode.store(true, Ordering::SeqCst);
        self.shared.auto_recovery.store(false, Ordering::SeqCst);
        info!("Entered maintenance mode");
    }

    pub fn exit_maintenance_mode(&self) {
        self.shared.maintenance_mode.store(false, Ordering::SeqCst);
        self.shared.auto_recovery.store(true, Ordering::SeqCst);
        info!("Exited maintenance mode");
    }

    pub fn is_maintenance_mode(&self) -> bool {
        self.shared.maintenance_mode.load(Ordering::SeqCst)
    }

    pub fn auto_recovery_enabled(&self) -> bool {
        self.shared.auto_recovery.load(Ordering::SeqCst)
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared.monitor.lock().is_some()
    }

    /// Spawn the monitoring loop on the current tokio runtime
    ///
    /// The first cycle runs one interval after the call. No-op if the loop is
    /// already running. The loop ends on its own once the last handle to this
    /// manager is dropped.
    pub fn start_monitoring(&self) {
        let mut monitor = self.shared.monitor.lock();
        if monitor.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        // The loop must not keep the manager alive on its own
        let weak_shared = Arc::downgrade(&self.shared);
        let period = self.shared.config.check_interval().max(Duration::from_millis(1));

        info!(interval = ?period, "Starting recovery monitoring");
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel_clone.cancelled() => {
                        info!("Recovery monitoring shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(shared) = weak_shared.upgrade() else {
                            debug!("Recovery manager dropped, monitoring exits");
                            break;
                        };
                        let manager = RecoveryManager { shared };
                        let report = manager.poll_once().await;
                        debug!(
                            checked = report.checked.len(),
                            failed = report.failed.len(),
                            launched = report.launched.len(),
                            skipped = report.skipped,
                            "Monitoring cycle complete"
                        );
                    }
                }
            }
        });

        *monitor = Some(MonitorHandle { cancel, task });
    }

    /// Stop the monitoring loop, waiting briefly for an in-progress cycle
    ///
    /// Recovery workers already started keep running; use
    /// [`wait_for_recoveries`](Self::wait_for_recoveries) to join them.
    pub async fn stop_monitoring(&self) {
        let handle = self.shared.monitor.lock().take();
        let Some(handle) = handle else {
            return;
        };
        handle.cancel.cancel();
        match tokio::time::timeout(STOP_TIMEOUT, handle.task).await {
            Ok(Ok(())) => info!("Recovery monitoring stopped"),
            Ok(Err(e)) => warn!(error = %e, "Monitoring task ended abnormally"),
            Err(_) => warn!("Monitoring task did not stop in time"),
        }
    }

    /// Run one monitoring cycle: probe due dependencies, launch due recoveries,
    /// prune the audit log
    ///
    /// Dependencies with a recovery in flight are not probed.
    pub async fn poll_once(&self) -> PollReport {
        if self.is_maintenance_mode() {
            debug!("Maintenance mode, skipping monitoring cycle");
            return PollReport {
                skipped: true,
                ..PollReport::default()
            };
        }

        let mut report = PollReport::default();
        self.check_all_services(&mut report).await;
        if self.auto_recovery_enabled() {
            self.launch_recoveries(&mut report);
        }
        self.cleanup_history();
        report
    }

    async fn check_all_services(&self, report: &mut PollReport) {
        for checker in self.sorted_checkers() {
            if !checker.is_enabled() || !checker.is_due_for_check() {
                continue;
            }
            // The worker owns the status until its attempt finishes
            if self.shared.active.lock().contains(checker.name()) {
                debug!(dependency = %checker.name(), "Recovery in flight, skipping probe");
                continue;
            }
            let name = checker.name().clone();
            let healthy = checker.check_health().await;
            if !healthy {
                self.shared.breakers.force_open(&name);
                report.failed.push(name.clone());
            }
            report.checked.push(name);
        }
    }

    fn launch_recoveries(&self, report: &mut PollReport) {
        for checker in self.sorted_checkers() {
            if !checker.ready_for_recovery() {
                continue;
            }
            let Some(active) = ActiveRecovery::claim(&self.shared, checker.name()) else {
                continue;
            };
            let Ok(permit) = self.shared.permits.clone().try_acquire_owned() else {
                debug!("Recovery concurrency ceiling reached");
                break;
            };

            report.launched.push(checker.name().clone());
            let manager = self.clone();
            self.shared.workers.spawn(async move {
                manager.perform_recovery(checker, permit, active).await;
            });
        }
    }

    async fn perform_recovery(
        &self,
        checker: Arc<ServiceHealthChecker>,
        _permit: OwnedSemaphorePermit,
        _active: ActiveRecovery,
    ) {
        let outcome = checker.attempt_recovery().await;
        self.finish_recovery(&checker, outcome, false);
    }

    fn finish_recovery(
        &self,
        checker: &ServiceHealthChecker,
        outcome: RecoveryOutcome,
        manual: bool,
    ) {
        if outcome == RecoveryOutcome::Refused {
            return;
        }
        let success = outcome.succeeded();
        self.shared.history.lock().push_back(RecoveryRecord {
            timestamp: self.shared.clock.now(),
            dependency: checker.name().clone(),
            success,
            retry_count: checker.retry_count(),
            manual,
        });
        if success {
            self.shared.breakers.reset(checker.name());
        }
    }

    /// Attempt recovery now, outside the retry schedule
    ///
    /// Does not consume the automatic retry budget when it fails. Returns
    /// `Refused` if a recovery for this dependency is already running.
    pub async fn manual_recovery(&self, dependency: &DependencyId) -> Result<RecoveryOutcome> {
        let checker = self.require_checker(dependency)?;
        let Some(_active) = ActiveRecovery::claim(&self.shared, dependency) else {
            return Ok(RecoveryOutcome::Refused);
        };

        info!(dependency = %dependency, "Manual recovery requested");
        let outcome = checker.attempt_recovery_out_of_schedule().await;
        self.finish_recovery(&checker, outcome, true);
        Ok(outcome)
    }

    /// Wait until every recovery worker started so far has finished
    pub async fn wait_for_recoveries(&self) {
        self.shared.workers.close();
        self.shared.workers.wait().await;
        self.shared.workers.reopen();
    }

    pub fn active_recoveries(&self) -> usize {
        self.shared.active.lock().len()
    }

    /// Audit log, oldest first
    pub fn recovery_history(&self) -> Vec<RecoveryRecord> {
        self.shared.history.lock().iter().cloned().collect()
    }

    fn cleanup_history(&self) {
        let cutoff = self.shared.clock.now() - to_chrono(self.shared.config.history_retention());
        self.shared
            .history
            .lock()
            .retain(|record| record.timestamp > cutoff);
    }

    pub fn get_system_status(&self) -> SystemStatus {
        let services: BTreeMap<_, _> = self
            .sorted_checkers()
            .iter()
            .map(|checker| (checker.name().clone(), checker.snapshot()))
            .collect();
        let healthy_services = services
            .values()
            .filter(|s| s.status == ServiceStatus::Healthy)
            .count();

        let cutoff = self.shared.clock.now() - RECENT_RECOVERY_WINDOW;
        let (recent, successful) = self
            .shared
            .history
            .lock()
            .iter()
            .filter(|r| r.timestamp > cutoff)
            .fold((0usize, 0usize), |(n, ok), r| (n + 1, ok + usize::from(r.success)));
        let recovery_success_rate = if recent == 0 {
            1.0
        } else {
            successful as f64 / recent as f64
        };

        SystemStatus {
            overall_health: SystemHealth::assess(healthy_services, services.len()),
            monitoring_enabled: self.is_monitoring(),
            maintenance_mode: self.is_maintenance_mode(),
            auto_recovery_enabled: self.auto_recovery_enabled(),
            total_services: services.len(),
            healthy_services,
            active_recoveries: self.active_recoveries(),
            recent_recoveries: recent,
            recovery_success_rate,
            services,
        }
    }

    /// Advisory list; nothing here is applied automatically
    pub fn get_recovery_recommendations(&self) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        for checker in self.sorted_checkers() {
            if checker.status() != ServiceStatus::Failed {
                continue;
            }
            if checker.retries_exhausted() {
                recommendations.push(Recommendation::manual_intervention(checker.name()));
            } else if !checker.is_enabled() {
                recommendations.push(Recommendation::enable_service(checker.name()));
            }
        }

        if self.is_maintenance_mode() {
            recommendations.push(Recommendation::exit_maintenance());
        }
        if !self.is_monitoring() {
            recommendations.push(Recommendation::enable_monitoring());
        }
        recommendations
    }

    /// Status plus the most recent recovery records
    pub fn status_export(&self) -> StatusExport {
        let history = self.shared.history.lock();
        let skip = history.len().saturating_sub(EXPORTED_HISTORY);
        let recovery_history = history.iter().skip(skip).cloned().collect();
        drop(history);

        StatusExport {
            export_timestamp: self.shared.clock.now(),
            status: self.get_system_status(),
            recovery_history,
        }
    }

    /// Write [`status_export`](Self::status_export) to `path` or the configured
    /// location; a failed write is recorded as a low-severity error
    pub async fn export_status(&self, path: Option<&Path>) -> StatusExport {
        let export = self.status_export();
        let target = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.shared.config.resolved_status_export_path());

        if let Err(e) = write_json(&target, &export).await {
            warn!(path = %target.display(), error = %e, "Failed to export recovery status");
            self.shared.metrics.record_error(
                ErrorEvent::from_error(&e)
                    .severity(Severity::Low)
                    .context("operation", "export_status"),
            );
        }
        export
    }

    pub fn metrics(&self) -> &Arc<ErrorMetrics> {
        &self.shared.metrics
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.shared.breakers
    }
}
