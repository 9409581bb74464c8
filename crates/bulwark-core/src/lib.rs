//! # Bulwark Core
//!
//! Resilience layer for calls to a flaky, possibly slow dependency:
//!
//! - [`ErrorMetrics`] keeps time-windowed error, recovery and latency
//!   statistics and classifies health from them.
//! - [`CircuitBreaker`] / [`BreakerRegistry`] fail fast once a dependency
//!   crosses its failure threshold.
//! - [`Deadline`], [`AdaptiveDeadline`] and [`with_retry`] bound how long a
//!   single call may take.
//! - [`ServiceHealthChecker`] and [`RecoveryManager`] probe dependencies in the
//!   background and run bounded recovery attempts.
//!
//! [`ResilienceContext`] wires all of these up from one
//! [`bulwark_config::ResilienceConfig`].

pub mod breaker;
pub mod clock;
pub mod context;
pub mod deadline;
pub mod dependency;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod recovery;

pub use breaker::{
    with_breaker, BreakerConfig, BreakerError, BreakerRegistry, BreakerStats, CircuitBreaker,
    CircuitState,
};
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use context::{GuardedResult, ResilienceContext};
pub use deadline::{
    with_deadline, with_retry, AdaptiveDeadline, Deadline, DeadlineError, OperationTimer,
    RetryPolicy,
};
pub use dependency::DependencyId;
pub use error::{ErrorKind, ResilienceError, Result, Severity};
pub use health::{
    CheckerSnapshot, HealthProbe, RecoveryAction, RecoveryOutcome, ServiceConfig,
    ServiceHealthChecker, ServiceStatus,
};
pub use metrics::{
    DowntimeInterval, ErrorEvent, ErrorMetrics, ErrorRecord, ErrorTrends, HealthStatus,
    MetricsSnapshot, OverallHealth, RecoveryStats, ServiceHealthReport, Trend,
};
pub use recovery::{
    PollReport, Recommendation, RecommendationKind, RecoveryManager, RecoveryRecord,
    StatusExport, SystemHealth, SystemStatus,
};

// Configuration types callers need to build components
pub use bulwark_config::{RecoveryStrategy, ResilienceConfig, ServicePolicyConfig};
