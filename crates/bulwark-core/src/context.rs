//! One wired-up set of resilience components
//!
//! [`ResilienceContext`] builds the metrics store, breaker registry and
//! recovery manager from a [`ResilienceConfig`] on a single shared clock, and
//! offers [`guarded_call`](ResilienceContext::guarded_call): breaker around
//! deadline around the caller's operation, with every outcome fed into the
//! metrics store.

use bulwark_config::ResilienceConfig;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::breaker::{BreakerConfig, BreakerError, BreakerRegistry};
use crate::clock::{system_clock, SharedClock};
use crate::deadline::{AdaptiveDeadline, Deadline, DeadlineError, OperationTimer, RetryPolicy};
use crate::dependency::DependencyId;
use crate::error::{ErrorKind, Result, Severity};
use crate::metrics::{ErrorEvent, ErrorMetrics};
use crate::recovery::RecoveryManager;

/// Result of [`ResilienceContext::guarded_call`]
pub type GuardedResult<T, E> = std::result::Result<T, BreakerError<DeadlineError<E>>>;

#[derive(Debug)]
pub struct ResilienceContext {
    config: ResilienceConfig,
    clock: SharedClock,
    metrics: Arc<ErrorMetrics>,
    breakers: Arc<BreakerRegistry>,
    recovery: RecoveryManager,
    adaptive: AdaptiveDeadline,
}

impl ResilienceContext {
    /// Validate `config` and build every component on the system clock
    pub fn from_config(config: &ResilienceConfig) -> Result<Self> {
        Self::with_clock(config, system_clock())
    }

    /// Validate `config` and build every component on `clock`
    pub fn with_clock(config: &ResilienceConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(ErrorMetrics::new(config.metrics.clone(), clock.clone()));
        let breakers = Arc::new(BreakerRegistry::new(
            BreakerConfig::from(&config.breaker),
            clock.clone(),
        ));
        let recovery = RecoveryManager::new(
            config.recovery.clone(),
            metrics.clone(),
            breakers.clone(),
            clock.clone(),
        );

        Ok(Self {
            adaptive: AdaptiveDeadline::from_config(&config.deadline),
            config: config.clone(),
            clock,
            metrics,
            breakers,
            recovery,
        })
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn metrics(&self) -> &Arc<ErrorMetrics> {
        &self.metrics
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn recovery(&self) -> &RecoveryManager {
        &self.recovery
    }

    /// Deadline for `operation` at the configured base timeout
    pub fn deadline(&self, operation: impl Into<String>) -> Deadline {
        Deadline::new(operation, self.config.deadline.base_timeout())
    }

    /// Deadline for `operation` following observed latency
    pub fn adaptive_deadline(&self, operation: impl Into<String>) -> Deadline {
        Deadline::new(operation, self.adaptive.recommended())
    }

    pub fn adaptive(&self) -> &AdaptiveDeadline {
        &self.adaptive
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.deadline.retry)
    }

    /// Run `operation` through the breaker for `dependency` under `deadline`
    ///
    /// Successes feed the response-time average and the adaptive deadline.
    /// Fast-fails, expiries and operation errors are recorded against
    /// `dependency`; an expiry counts as a breaker failure.
    pub async fn guarded_call<F, Fut, T, E>(
        &self,
        dependency: &DependencyId,
        deadline: &Deadline,
        operation: F,
    ) -> GuardedResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let timer = OperationTimer::start(deadline.operation());
        let result = self
            .breakers
            .call(dependency, || deadline.run(operation()))
            .await;
        let elapsed = timer.finish();

        match &result {
            Ok(_) => {
                self.metrics.record_response_time(elapsed);
                self.adaptive.record_success(elapsed);
            }
            Err(BreakerError::Open { .. }) => self.record(
                dependency,
                ErrorKind::BreakerOpen,
                Severity::Low,
                format!("Circuit breaker is open for '{dependency}'"),
            ),
            Err(BreakerError::Inner(DeadlineError::Exceeded { operation, limit })) => self.record(
                dependency,
                ErrorKind::DeadlineExceeded,
                Severity::Medium,
                format!("{operation} timed out after {limit:?}"),
            ),
            Err(BreakerError::Inner(DeadlineError::Inner(e))) => self.record(
                dependency,
                ErrorKind::OperationFailure,
                Severity::Medium,
                e.to_string(),
            ),
        }
        result
    }

    /// Like [`guarded_call`](Self::guarded_call), answering with `fallback`
    /// instead of an error and counting the fallback use
    pub async fn guarded_call_or_else<F, Fut, T, E, G>(
        &self,
        dependency: &DependencyId,
        deadline: &Deadline,
        operation: F,
        fallback: G,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
        G: FnOnce() -> T,
    {
        match self.guarded_call(dependency, deadline, operation).await {
            Ok(value) => value,
            Err(_) => {
                self.metrics.record_fallback_usage();
                fallback()
            }
        }
    }

    fn record(&self, dependency: &DependencyId, kind: ErrorKind, severity: Severity, message: String) {
        self.metrics.record_error(
            ErrorEvent::new(kind, message)
                .severity(severity)
                .dependency(dependency),
        );
    }
}
