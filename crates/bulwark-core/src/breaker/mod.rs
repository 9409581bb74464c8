//! Circuit Breaker
//!
//! Per-dependency fail-fast guard. Consecutive failures open the breaker; once
//! the recovery timeout has passed a single trial call is let through
//! (half-open), and its outcome either closes the breaker again or reopens it.
//!
//! The breaker never swallows the wrapped operation's error. Callers get it
//! back untouched inside [`BreakerError::Inner`], or a synthesized
//! [`BreakerError::Open`] when no call was made.

mod registry;

pub use registry::BreakerRegistry;

use bulwark_config::BreakerComponentConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::{to_chrono, SharedClock};
use crate::dependency::DependencyId;
use crate::error::{dependency_label, ResilienceError};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls fail fast
    Open,
    /// One trial call is allowed to test the dependency
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Failures before the breaker opens
    pub failure_threshold: u32,
    /// Time to stay open before a trial call is allowed
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&BreakerComponentConfig> for BreakerConfig {
    fn from(config: &BreakerComponentConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: config.recovery_timeout(),
        }
    }
}

/// Outcome of a call through a breaker
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// Short-circuited; the operation was not invoked
    #[error("Circuit breaker is open for {}", dependency_label(.dependency))]
    Open {
        dependency: Option<DependencyId>,
        last_failure: Option<DateTime<Utc>>,
    },

    /// The operation's own failure
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// The wrapped failure, if the operation ran
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}

impl<E: Into<ResilienceError>> BreakerError<E> {
    /// Flatten into the crate error
    pub fn into_resilience_error(self) -> ResilienceError {
        match self {
            BreakerError::Open {
                dependency,
                last_failure,
            } => ResilienceError::BreakerOpen {
                dependency,
                last_failure,
            },
            BreakerError::Inner(e) => e.into(),
        }
    }
}

impl<E: Into<ResilienceError>> From<BreakerError<E>> for ResilienceError {
    fn from(err: BreakerError<E>) -> Self {
        err.into_resilience_error()
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStats {
    pub dependency: Option<DependencyId>,
    pub state: CircuitState,
    pub failure_count: u32,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Successes / calls, 1.0 before the first call
    pub success_rate: f64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub failure_threshold: u32,
    pub recovery_timeout_seconds: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    trial_in_flight: bool,
}

impl Default for BreakerInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            total_calls: 0,
            total_successes: 0,
            total_failures: 0,
            trial_in_flight: false,
        }
    }
}

/// Whether a call was admitted, and if so as the half-open trial
enum Admission {
    Normal,
    Trial,
    Rejected(Option<DateTime<Utc>>),
}

/// Clears the half-open trial flag if the trial future is dropped mid-flight
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.inner.lock().trial_in_flight = false;
        }
    }
}

/// Circuit breaker for preventing cascading failures
#[derive(Debug)]
pub struct CircuitBreaker {
    name: Option<DependencyId>,
    config: BreakerConfig,
    clock: SharedClock,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, clock: SharedClock) -> Self {
        Self {
            name: None,
            config,
            clock,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// A breaker guarding a named dependency
    pub fn named(dependency: DependencyId, config: BreakerConfig, clock: SharedClock) -> Self {
        Self {
            name: Some(dependency),
            ..Self::new(config, clock)
        }
    }

    pub fn dependency(&self) -> Option<&DependencyId> {
        self.name.as_ref()
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker, counting every failure
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_with_classifier(operation, |_| true).await
    }

    /// Run `operation` through the breaker
    ///
    /// Only failures for which `is_failure` returns true count against the
    /// breaker; the rest are handed back without touching its state.
    pub async fn call_with_classifier<F, Fut, T, E, C>(
        &self,
        operation: F,
        is_failure: C,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        let trial = match self.admit() {
            Admission::Normal => false,
            Admission::Trial => true,
            Admission::Rejected(last_failure) => {
                debug!(dependency = ?self.name.as_ref().map(|d| d.as_str()), "Call rejected, breaker open");
                return Err(BreakerError::Open {
                    dependency: self.name.clone(),
                    last_failure,
                });
            }
        };

        let mut guard = TrialGuard {
            breaker: self,
            armed: trial,
        };

        match operation().await {
            Ok(value) => {
                guard.armed = false;
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                if is_failure(&error) {
                    guard.armed = false;
                    self.on_failure();
                }
                Err(BreakerError::Inner(error))
            }
        }
    }

    fn admit(&self) -> Admission {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.total_calls += 1;

        match inner.state {
            CircuitState::Closed => Admission::Normal,
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure_time
                    .map_or(true, |t| now - t >= to_chrono(self.config.recovery_timeout));
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(
                        dependency = ?self.name.as_ref().map(|d| d.as_str()),
                        "Circuit breaker moving to half-open state"
                    );
                    Admission::Trial
                } else {
                    Admission::Rejected(inner.last_failure_time)
                }
            }
            CircuitState::HalfOpen if inner.trial_in_flight => {
                Admission::Rejected(inner.last_failure_time)
            }
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Admission::Trial
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.trial_in_flight = false;
            info!(
                dependency = ?self.name.as_ref().map(|d| d.as_str()),
                "Circuit breaker closed after successful trial"
            );
        }
    }

    fn on_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.total_failures += 1;
        inner.last_failure_time = Some(now);

        let previous = inner.state;
        if inner.failure_count >= self.config.failure_threshold || previous == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.trial_in_flight = false;
            if previous != CircuitState::Open {
                warn!(
                    dependency = ?self.name.as_ref().map(|d| d.as_str()),
                    failures = inner.failure_count,
                    from = %previous,
                    "Circuit breaker opened"
                );
            }
        }
    }

    /// Open the breaker now, restarting the cooldown
    pub fn force_open(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            warn!(dependency = ?self.name.as_ref().map(|d| d.as_str()), "Circuit breaker forced open");
        }
        inner.state = CircuitState::Open;
        inner.last_failure_time = Some(now);
        inner.trial_in_flight = false;
    }

    /// Close the breaker and clear the failure count; lifetime counters are kept
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!(dependency = ?self.name.as_ref().map(|d| d.as_str()), "Circuit breaker reset");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
        inner.trial_in_flight = false;
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock();
        let success_rate = if inner.total_calls == 0 {
            1.0
        } else {
            inner.total_successes as f64 / inner.total_calls as f64
        };

        BreakerStats {
            dependency: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            total_calls: inner.total_calls,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            success_rate,
            last_failure_time: inner.last_failure_time,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_seconds: self.config.recovery_timeout.as_secs(),
        }
    }
}

/// Combinator form of [`CircuitBreaker::call`]
pub async fn with_breaker<F, Fut, T, E>(
    breaker: &CircuitBreaker,
    operation: F,
) -> Result<T, BreakerError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    breaker.call(operation).await
}
