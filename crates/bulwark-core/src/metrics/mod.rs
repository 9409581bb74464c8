//! Error Metrics Store
//!
//! Records failures, recovery attempts and latencies in bounded, time-windowed
//! histories and derives rates, health classifications and trend summaries
//! from them.
//!
//! All state sits behind one lock; every public method takes it once and works
//! against a single `now` read from the clock, so a report is always internally
//! consistent even while recovery workers keep recording.
//!
//! Persistence is explicit: nothing touches the disk unless
//! [`ErrorMetrics::export_metrics`] or [`ErrorMetrics::import_metrics`] is
//! called.

mod health;
mod record;
mod snapshot;

pub use health::{
    classify, ErrorKindCount, ErrorTrends, HealthStatus, OverallHealth, ServiceHealthReport,
    Trend,
};
pub use record::{DowntimeInterval, ErrorEvent, ErrorRecord, RecoveryStats};
pub use snapshot::{MetricsSnapshot, PerformanceStats};

use bulwark_config::MetricsComponentConfig;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::{to_chrono, SharedClock};
use crate::dependency::DependencyId;
use crate::error::{ErrorKind, ResilienceError, Result, Severity};

/// Records older than this are never back-filled with recovery outcomes
const RECOVERY_GRACE: ChronoDuration = ChronoDuration::minutes(5);
/// Window for `should_trigger_recovery`
const TRIGGER_WINDOW: ChronoDuration = ChronoDuration::minutes(5);
const TRIGGER_MIN_ERRORS: usize = 3;
/// Global throttle between recovery attempts
const RECOVERY_THROTTLE: ChronoDuration = ChronoDuration::seconds(60);
const HEALTH_STALENESS: ChronoDuration = ChronoDuration::minutes(5);
const HOUR: ChronoDuration = ChronoDuration::hours(1);
const DAY: ChronoDuration = ChronoDuration::hours(24);
const DAY_SECONDS: f64 = 86_400.0;
const TOP_ERROR_TYPES: usize = 5;

#[derive(Debug, Default)]
struct MetricsState {
    history: VecDeque<ErrorRecord>,
    error_counts: BTreeMap<ErrorKind, u64>,
    dependency_errors: HashMap<DependencyId, Vec<DateTime<Utc>>>,
    recovery: RecoveryStats,
    response_times: VecDeque<Duration>,
    fallback_usage: u64,
    downtimes: HashMap<DependencyId, Vec<DowntimeInterval>>,
    last_health_check: Option<DateTime<Utc>>,
    current_health: HealthStatus,
}

impl MetricsState {
    fn errors_since(&self, cutoff: DateTime<Utc>) -> impl Iterator<Item = &ErrorRecord> {
        self.history.iter().filter(move |e| e.timestamp > cutoff)
    }

    fn error_rate(&self, now: DateTime<Utc>, window: ChronoDuration) -> f64 {
        if window <= ChronoDuration::zero() {
            return 0.0;
        }
        let minutes = window.num_milliseconds() as f64 / 60_000.0;
        let count = self.errors_since(now - window).count();
        count as f64 / minutes
    }

    fn average_response_time(&self) -> Duration {
        if self.response_times.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.response_times.iter().sum();
        total / self.response_times.len() as u32
    }

    fn service_health(&self, dependency: &DependencyId, now: DateTime<Utc>) -> ServiceHealthReport {
        let recent: Vec<DateTime<Utc>> = self
            .dependency_errors
            .get(dependency)
            .map(|timestamps| {
                timestamps
                    .iter()
                    .copied()
                    .filter(|t| now - *t < HOUR)
                    .collect()
            })
            .unwrap_or_default();
        let error_rate = recent.len() as f64 / 60.0;

        let total_downtime: f64 = self
            .downtimes
            .get(dependency)
            .map(|intervals| {
                intervals
                    .iter()
                    .filter(|d| now - d.start < DAY)
                    .map(|d| d.duration_seconds)
                    .sum()
            })
            .unwrap_or(0.0);
        let uptime_percentage = (100.0 - total_downtime / DAY_SECONDS * 100.0).max(0.0);

        ServiceHealthReport {
            dependency: dependency.clone(),
            status: classify(error_rate, uptime_percentage),
            error_rate,
            recent_errors: recent.len(),
            uptime_percentage,
            total_downtime_24h_seconds: total_downtime,
            last_error: recent.iter().max().copied(),
        }
    }

    fn overall_health(&mut self, now: DateTime<Utc>) -> OverallHealth {
        let recent_errors_1h = self.errors_since(now - HOUR).count();
        let error_rate = self.error_rate(now, HOUR);
        let status = classify(error_rate, 100.0);

        self.current_health = status;
        self.last_health_check = Some(now);

        OverallHealth {
            overall_health: status,
            error_rate_per_minute: error_rate,
            recent_errors_1h,
            average_response_time: self.average_response_time().as_secs_f64(),
            fallback_usage_count: self.fallback_usage,
            recovery_success_rate: self.recovery.success_rate(),
            recovery_attempts: self.recovery.attempts,
            successful_recoveries: self.recovery.successful,
            last_health_check: self.last_health_check,
        }
    }

    fn trends(&self, now: DateTime<Utc>) -> ErrorTrends {
        let errors_last_hour = self.errors_since(now - HOUR).count();
        let errors_last_day = self.errors_since(now - DAY).count();

        let mut by_kind: BTreeMap<ErrorKind, u64> = BTreeMap::new();
        for error in self.errors_since(now - HOUR) {
            *by_kind.entry(error.kind).or_default() += 1;
        }
        let mut top_error_types: Vec<ErrorKindCount> = by_kind
            .into_iter()
            .map(|(kind, count)| ErrorKindCount { kind, count })
            .collect();
        // Stable sort keeps kind order among equal counts
        top_error_types.sort_by(|a, b| b.count.cmp(&a.count));
        top_error_types.truncate(TOP_ERROR_TYPES);

        let service_reliability = self
            .dependency_errors
            .keys()
            .map(|dep| (dep.clone(), self.service_health(dep, now).uptime_percentage))
            .collect();

        let trend = if errors_last_hour as f64 > errors_last_day as f64 / 24.0 {
            Trend::Increasing
        } else {
            Trend::Stable
        };

        ErrorTrends {
            errors_last_hour,
            errors_last_day,
            trend,
            top_error_types,
            service_reliability,
            analysis_timestamp: Some(now),
        }
    }

    fn push_record(&mut self, record: ErrorRecord, max_history: usize, window: ChronoDuration) {
        *self.error_counts.entry(record.kind).or_default() += 1;
        if let Some(dep) = record.charged_dependency() {
            self.index_dependency_error(dep.clone(), record.timestamp, record.timestamp - window);
        }
        self.append_history(record, max_history);
    }

    fn append_history(&mut self, record: ErrorRecord, max_history: usize) {
        self.history.push_back(record);
        while self.history.len() > max_history {
            self.history.pop_front();
        }
    }

    fn index_dependency_error(
        &mut self,
        dependency: DependencyId,
        timestamp: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) {
        let timestamps = self.dependency_errors.entry(dependency).or_default();
        timestamps.push(timestamp);
        timestamps.retain(|t| *t > cutoff);
    }
}

/// Time-windowed error, recovery and latency statistics
#[derive(Debug)]
pub struct ErrorMetrics {
    state: Mutex<MetricsState>,
    config: MetricsComponentConfig,
    clock: SharedClock,
}

impl ErrorMetrics {
    pub fn new(config: MetricsComponentConfig, clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(MetricsState::default()),
            config,
            clock,
        }
    }

    pub fn with_defaults(clock: SharedClock) -> Self {
        Self::new(MetricsComponentConfig::default(), clock)
    }

    fn window(&self) -> ChronoDuration {
        to_chrono(self.config.history_window())
    }

    /// Append an error record
    pub fn record_error(&self, event: ErrorEvent) {
        let now = self.clock.now();
        debug!(
            kind = %event.kind,
            severity = %event.severity,
            dependency = ?event.dependency.as_ref().map(|d| d.as_str()),
            "Recording error: {}",
            event.message
        );
        let record = event.into_record(now);
        let window = self.window();
        self.state
            .lock()
            .push_record(record, self.config.max_history.max(1), window);
    }

    /// Record a crate error under its own kind
    pub fn record_failure(
        &self,
        error: &ResilienceError,
        severity: Severity,
        dependency: Option<&DependencyId>,
    ) {
        let mut event = ErrorEvent::from_error(error).severity(severity);
        if let Some(dep) = dependency {
            event = event.dependency(dep);
        }
        self.record_error(event);
    }

    /// Count a recovery attempt and back-fill the newest unresolved record for
    /// `dependency` that is younger than five minutes.
    pub fn record_recovery_attempt(&self, dependency: &DependencyId, succeeded: bool) {
        let now = self.clock.now();
        let mut state = self.state.lock();

        state.recovery.attempts += 1;
        state.recovery.last_attempt = Some(now);
        if succeeded {
            state.recovery.successful += 1;
        }

        for record in state.history.iter_mut().rev() {
            if now - record.timestamp >= RECOVERY_GRACE {
                break;
            }
            if record.charged_dependency() == Some(dependency) && !record.recovery_attempted {
                record.recovery_attempted = true;
                record.recovery_succeeded = succeeded;
                break;
            }
        }

        debug!(dependency = %dependency, succeeded, "Recorded recovery attempt");
    }

    pub fn record_response_time(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.response_times.push_back(duration);
        while state.response_times.len() > self.config.response_time_samples.max(1) {
            state.response_times.pop_front();
        }
    }

    /// Count a call that was served by a fallback instead of the dependency
    pub fn record_fallback_usage(&self) {
        self.state.lock().fallback_usage += 1;
    }

    /// Record a span during which `dependency` was failed; spans older than a day are pruned
    pub fn record_downtime(&self, dependency: &DependencyId, start: DateTime<Utc>, end: DateTime<Utc>) {
        let now = self.clock.now();
        let interval = DowntimeInterval::new(dependency.clone(), start, end);
        debug!(
            dependency = %dependency,
            seconds = interval.duration_seconds,
            "Recorded downtime"
        );

        let mut state = self.state.lock();
        let intervals = state.downtimes.entry(dependency.clone()).or_default();
        intervals.push(interval);
        intervals.retain(|d| d.start > now - DAY);
    }

    /// Errors recorded within `window` of now
    pub fn recent_errors(&self, window: Duration) -> Vec<ErrorRecord> {
        let cutoff = self.clock.now() - to_chrono(window);
        self.state.lock().errors_since(cutoff).cloned().collect()
    }

    /// Errors per minute over `window`; zero for non-positive windows
    pub fn get_error_rate(&self, window: ChronoDuration) -> f64 {
        let now = self.clock.now();
        self.state.lock().error_rate(now, window)
    }

    pub fn get_service_health(&self, dependency: &DependencyId) -> ServiceHealthReport {
        let now = self.clock.now();
        self.state.lock().service_health(dependency, now)
    }

    /// Classify the whole system and refresh the cached classification
    pub fn get_overall_health(&self) -> OverallHealth {
        let now = self.clock.now();
        self.state.lock().overall_health(now)
    }

    /// Cached overall classification, recomputed once it is five minutes old
    pub fn current_health(&self) -> HealthStatus {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let stale = state
            .last_health_check
            .map_or(true, |checked| now - checked > HEALTH_STALENESS);
        if stale {
            state.overall_health(now).overall_health
        } else {
            state.current_health
        }
    }

    /// True when `dependency` has at least three errors in the last five
    /// minutes and no recovery (for any dependency) started in the last minute.
    pub fn should_trigger_recovery(&self, dependency: &DependencyId) -> bool {
        let now = self.clock.now();
        let state = self.state.lock();

        if let Some(last) = state.recovery.last_attempt {
            if now - last < RECOVERY_THROTTLE {
                return false;
            }
        }

        let recent = state
            .dependency_errors
            .get(dependency)
            .map(|timestamps| timestamps.iter().filter(|t| now - **t < TRIGGER_WINDOW).count())
            .unwrap_or(0);
        recent >= TRIGGER_MIN_ERRORS
    }

    pub fn get_error_trends(&self) -> ErrorTrends {
        let now = self.clock.now();
        self.state.lock().trends(now)
    }

    pub fn average_response_time(&self) -> Duration {
        self.state.lock().average_response_time()
    }

    pub fn recovery_stats(&self) -> RecoveryStats {
        self.state.lock().recovery.clone()
    }

    pub fn error_counts(&self) -> BTreeMap<ErrorKind, u64> {
        self.state.lock().error_counts.clone()
    }

    /// Full error history, oldest first
    pub fn history(&self) -> Vec<ErrorRecord> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn fallback_usage(&self) -> u64 {
        self.state.lock().fallback_usage
    }

    /// In-memory snapshot of all state plus derived summaries
    pub fn export(&self) -> MetricsSnapshot {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let health_summary = state.overall_health(now);
        let trends = state.trends(now);

        MetricsSnapshot {
            export_timestamp: now,
            error_history: state.history.iter().cloned().collect(),
            error_counts: state.error_counts.clone(),
            recovery_stats: state.recovery.clone(),
            performance_stats: PerformanceStats {
                avg_response_time: state.average_response_time().as_secs_f64(),
                fallback_usage: state.fallback_usage,
            },
            health_summary,
            trends,
        }
    }

    /// Merge a snapshot into this store
    ///
    /// History is appended (still bounded), per-kind counts and recovery
    /// counters are replaced by the snapshot's values, and the per-dependency
    /// index is rebuilt for records still inside the rolling window.
    pub fn import(&self, snapshot: MetricsSnapshot) {
        let now = self.clock.now();
        let cutoff = now - self.window();
        let max_history = self.config.max_history.max(1);
        let mut state = self.state.lock();

        for record in snapshot.error_history {
            if let Some(dep) = record.charged_dependency() {
                if record.timestamp > cutoff {
                    state.index_dependency_error(dep.clone(), record.timestamp, cutoff);
                }
            }
            state.append_history(record, max_history);
        }
        for (kind, count) in snapshot.error_counts {
            state.error_counts.insert(kind, count);
        }
        state.recovery = snapshot.recovery_stats;
        state.fallback_usage = snapshot.performance_stats.fallback_usage;
    }

    /// Export to `path` (or the configured default) as pretty JSON
    ///
    /// Persistence is best-effort: a failed write is recorded as a low-severity
    /// error and the snapshot is still returned.
    pub async fn export_metrics(&self, path: Option<&Path>) -> MetricsSnapshot {
        let snapshot = self.export();
        let target = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.resolved_export_path());

        if let Err(e) = write_json(&target, &snapshot).await {
            warn!(path = %target.display(), error = %e, "Failed to export metrics");
            self.record_error(
                ErrorEvent::from_error(&e)
                    .severity(Severity::Low)
                    .context("operation", "export_metrics"),
            );
        }

        snapshot
    }

    /// Load a snapshot written by [`export_metrics`](Self::export_metrics) and merge it in
    pub async fn import_metrics(&self, path: &Path) -> Result<()> {
        let loaded = async {
            let bytes = tokio::fs::read(path).await?;
            let snapshot: MetricsSnapshot = serde_json::from_slice(&bytes)?;
            Ok::<_, ResilienceError>(snapshot)
        }
        .await;

        match loaded {
            Ok(snapshot) => {
                self.import(snapshot);
                Ok(())
            }
            Err(e) => {
                let error = ResilienceError::Configuration(format!(
                    "Failed to import metrics from {}: {e}",
                    path.display()
                ));
                self.record_error(
                    ErrorEvent::from_error(&error)
                        .severity(Severity::Low)
                        .context("operation", "import_metrics"),
                );
                Err(error)
            }
        }
    }

    /// Clear everything
    pub fn reset(&self) {
        *self.state.lock() = MetricsState::default();
    }
}

pub(crate) async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Arc;

    fn store() -> (Arc<ManualClock>, ErrorMetrics) {
        let clock = ManualClock::starting_now();
        let metrics = ErrorMetrics::with_defaults(clock.clone());
        (clock, metrics)
    }

    fn dep(name: &str) -> DependencyId {
        DependencyId::parse(name).unwrap()
    }

    fn failure(dependency: &DependencyId) -> ErrorEvent {
        ErrorEvent::new(ErrorKind::ServiceUnavailable, "connection refused").dependency(dependency)
    }

    #[test]
    fn test_history_is_bounded() {
        let clock = ManualClock::starting_now();
        let config = MetricsComponentConfig {
            max_history: 3,
            ..Default::default()
        };
        let metrics = ErrorMetrics::new(config, clock.clone());

        for i in 0..5 {
            metrics.record_error(ErrorEvent::new(ErrorKind::OperationFailure, format!("e{i}")));
        }

        let history = metrics.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message, "e2");
        assert_eq!(metrics.error_counts()[&ErrorKind::OperationFailure], 5);
    }

    #[test]
    fn test_scenario_c_trigger_then_throttle() {
        let (clock, metrics) = store();
        let x = dep("X");

        for _ in 0..4 {
            metrics.record_error(failure(&x));
            clock.advance_secs(60);
        }
        // Errors now span the last four minutes
        assert!(metrics.should_trigger_recovery(&x));

        metrics.record_recovery_attempt(&x, false);
        assert!(!metrics.should_trigger_recovery(&x));
    }

    #[test]
    fn test_trigger_needs_both_conditions() {
        let (clock, metrics) = store();
        let x = dep("X");

        metrics.record_recovery_attempt(&x, false);
        for _ in 0..3 {
            metrics.record_error(failure(&x));
        }
        // Enough errors but still throttled
        assert!(!metrics.should_trigger_recovery(&x));

        clock.advance_secs(61);
        assert!(metrics.should_trigger_recovery(&x));

        // Throttle clear but errors aged out of the five minute window
        clock.advance_secs(300);
        assert!(!metrics.should_trigger_recovery(&x));
    }

    #[test]
    fn test_two_errors_do_not_trigger() {
        let (_clock, metrics) = store();
        let x = dep("X");
        metrics.record_error(failure(&x));
        metrics.record_error(failure(&x));
        assert!(!metrics.should_trigger_recovery(&x));
    }

    #[test]
    fn test_backfill_marks_most_recent_unresolved_record() {
        let (clock, metrics) = store();
        let x = dep("X");
        let y = dep("Y");

        metrics.record_error(failure(&x).context("n", 1));
        clock.advance_secs(10);
        metrics.record_error(failure(&x).context("n", 2));
        clock.advance_secs(10);
        metrics.record_error(failure(&y));

        metrics.record_recovery_attempt(&x, true);
        let history = metrics.history();
        assert!(!history[0].recovery_attempted);
        assert!(history[1].recovery_attempted);
        assert!(history[1].recovery_succeeded);
        assert!(!history[2].recovery_attempted);

        metrics.record_recovery_attempt(&x, false);
        let history = metrics.history();
        assert!(history[0].recovery_attempted);
        assert!(!history[0].recovery_succeeded);
    }

    #[test]
    fn test_backfill_ignores_records_older_than_grace() {
        let (clock, metrics) = store();
        let x = dep("X");

        metrics.record_error(failure(&x));
        clock.advance_secs(301);
        metrics.record_recovery_attempt(&x, true);

        assert!(!metrics.history()[0].recovery_attempted);
        assert_eq!(metrics.recovery_stats().attempts, 1);
        assert_eq!(metrics.recovery_stats().successful, 1);
    }

    #[test]
    fn test_error_rate_windows() {
        let (clock, metrics) = store();
        for _ in 0..6 {
            metrics.record_error(ErrorEvent::new(ErrorKind::OperationFailure, "boom"));
        }
        clock.advance_secs(1);

        assert_eq!(metrics.get_error_rate(ChronoDuration::minutes(2)), 3.0);
        assert_eq!(metrics.get_error_rate(ChronoDuration::zero()), 0.0);
        assert_eq!(metrics.get_error_rate(ChronoDuration::minutes(-5)), 0.0);

        clock.advance_secs(180);
        assert_eq!(metrics.get_error_rate(ChronoDuration::minutes(2)), 0.0);
    }

    #[test]
    fn test_service_health_tiers() {
        let (clock, metrics) = store();
        let x = dep("X");

        assert_eq!(metrics.get_service_health(&x).status, HealthStatus::Healthy);

        // 3 errors in the hour = 0.05/min
        for _ in 0..3 {
            metrics.record_error(failure(&x));
        }
        let report = metrics.get_service_health(&x);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.recent_errors, 3);
        assert!(report.last_error.is_some());

        // 12 errors = 0.2/min
        for _ in 0..9 {
            metrics.record_error(failure(&x));
        }
        assert_eq!(metrics.get_service_health(&x).status, HealthStatus::Unhealthy);

        // 30 errors = 0.5/min
        for _ in 0..18 {
            metrics.record_error(failure(&x));
        }
        assert_eq!(metrics.get_service_health(&x).status, HealthStatus::Critical);

        clock.advance_secs(3601);
        assert_eq!(metrics.get_service_health(&x).status, HealthStatus::Healthy);
    }

    #[test]
    fn test_downtime_lowers_uptime() {
        let (clock, metrics) = store();
        let x = dep("X");
        let now = clock.now();

        // 2.4h of downtime is 10% of a day
        metrics.record_downtime(&x, now - ChronoDuration::minutes(144), now);
        let report = metrics.get_service_health(&x);
        assert!((report.uptime_percentage - 90.0).abs() < 1e-9);
        assert_eq!(report.status, HealthStatus::Unhealthy);

        clock.advance(ChronoDuration::hours(25));
        assert_eq!(metrics.get_service_health(&x).uptime_percentage, 100.0);
    }

    #[test]
    fn test_uptime_floors_at_zero() {
        let (clock, metrics) = store();
        let x = dep("X");
        let now = clock.now();
        metrics.record_downtime(&x, now - ChronoDuration::hours(23), now);
        metrics.record_downtime(&x, now - ChronoDuration::hours(23), now);
        assert_eq!(metrics.get_service_health(&x).uptime_percentage, 0.0);
    }

    #[test]
    fn test_overall_health_and_recovery_rate() {
        let (_clock, metrics) = store();
        let health = metrics.get_overall_health();
        assert_eq!(health.overall_health, HealthStatus::Healthy);
        assert_eq!(health.recovery_success_rate, 1.0);

        let x = dep("X");
        metrics.record_recovery_attempt(&x, true);
        metrics.record_recovery_attempt(&x, false);
        metrics.record_error(failure(&x));
        let health = metrics.get_overall_health();
        assert_eq!(health.recovery_success_rate, 0.5);
        assert_eq!(health.overall_health, HealthStatus::Degraded);
        assert_eq!(health.recent_errors_1h, 1);
    }

    #[test]
    fn test_current_health_recomputes_only_when_stale() {
        let (clock, metrics) = store();
        assert_eq!(metrics.current_health(), HealthStatus::Healthy);

        for _ in 0..40 {
            metrics.record_error(ErrorEvent::new(ErrorKind::OperationFailure, "boom"));
        }
        // Cached value still fresh
        assert_eq!(metrics.current_health(), HealthStatus::Healthy);

        clock.advance_secs(301);
        assert_eq!(metrics.current_health(), HealthStatus::Critical);
    }

    #[test]
    fn test_response_time_average_is_rolling() {
        let (_clock, metrics) = store();
        assert_eq!(metrics.average_response_time(), Duration::ZERO);

        for _ in 0..100 {
            metrics.record_response_time(Duration::from_secs(10));
        }
        for _ in 0..100 {
            metrics.record_response_time(Duration::from_secs(2));
        }
        assert_eq!(metrics.average_response_time(), Duration::from_secs(2));
    }

    #[test]
    fn test_trends() {
        let (clock, metrics) = store();
        let x = dep("X");

        metrics.record_error(ErrorEvent::new(ErrorKind::DeadlineExceeded, "slow"));
        clock.advance(ChronoDuration::hours(2));
        metrics.record_error(failure(&x));
        metrics.record_error(failure(&x));
        metrics.record_error(ErrorEvent::new(ErrorKind::DeadlineExceeded, "slow"));

        let trends = metrics.get_error_trends();
        assert_eq!(trends.errors_last_hour, 3);
        assert_eq!(trends.errors_last_day, 4);
        assert_eq!(trends.trend, Trend::Increasing);
        assert_eq!(
            trends.top_error_types[0],
            ErrorKindCount {
                kind: ErrorKind::ServiceUnavailable,
                count: 2
            }
        );
        assert_eq!(trends.service_reliability.get(&x), Some(&100.0));
    }

    #[test]
    fn test_breaker_fast_fails_do_not_count_against_dependency() {
        let (_clock, metrics) = store();
        let x = dep("X");
        for _ in 0..5 {
            metrics.record_error(
                ErrorEvent::new(ErrorKind::BreakerOpen, "Circuit breaker is open for 'X'")
                    .severity(Severity::Low)
                    .dependency(&x),
            );
        }

        assert_eq!(metrics.error_counts()[&ErrorKind::BreakerOpen], 5);
        assert_eq!(metrics.history().len(), 5);
        let report = metrics.get_service_health(&x);
        assert_eq!(report.recent_errors, 0);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(!metrics.should_trigger_recovery(&x));

        metrics.record_error(failure(&x));
        metrics.record_recovery_attempt(&x, true);
        let history = metrics.history();
        assert!(history[5].recovery_attempted);
        assert!(history[..5].iter().all(|r| !r.recovery_attempted));
    }

    #[test]
    fn test_reset_clears_everything() {
        let (_clock, metrics) = store();
        let x = dep("X");
        metrics.record_error(failure(&x));
        metrics.record_recovery_attempt(&x, true);
        metrics.record_fallback_usage();
        metrics.record_response_time(Duration::from_millis(5));

        metrics.reset();

        assert!(metrics.history().is_empty());
        assert!(metrics.error_counts().is_empty());
        assert_eq!(metrics.recovery_stats(), RecoveryStats::default());
        assert_eq!(metrics.fallback_usage(), 0);
        assert_eq!(metrics.average_response_time(), Duration::ZERO);
        assert_eq!(metrics.get_service_health(&x).recent_errors, 0);
    }

    #[test]
    fn test_import_export_in_memory() {
        let (_clock, metrics) = store();
        let x = dep("X");
        for _ in 0..3 {
            metrics.record_error(failure(&x));
        }
        metrics.record_error(ErrorEvent::new(ErrorKind::DeadlineExceeded, "slow"));
        metrics.record_recovery_attempt(&x, true);
        metrics.record_fallback_usage();

        let snapshot = metrics.export();
        assert_eq!(snapshot.health_summary.recovery_attempts, 1);

        let (_clock2, restored) = store();
        restored.import(snapshot.clone());
        assert_eq!(restored.error_counts(), metrics.error_counts());
        assert_eq!(restored.recovery_stats(), metrics.recovery_stats());
        assert_eq!(restored.fallback_usage(), 1);
        assert_eq!(restored.history(), metrics.history());
        assert_eq!(restored.get_service_health(&x).recent_errors, 3);
    }
}
