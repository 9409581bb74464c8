//! Error taxonomy
//!
//! [`ErrorKind`] and [`Severity`] are the closed tags the metrics store counts
//! by. [`ResilienceError`] is the crate-level error; the breaker and deadline
//! wrappers have their own generic errors that carry the caller's failure
//! through untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::dependency::DependencyId;

/// What went wrong, as recorded in the metrics store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An operation ran past its deadline
    DeadlineExceeded,
    /// A call was short-circuited by an open breaker
    BreakerOpen,
    /// A health probe raised
    ProbeFailure,
    /// A recovery action raised or reported failure
    RecoveryFailure,
    /// Persisted state or configuration could not be read
    Configuration,
    /// The dependency refused or could not be reached
    ServiceUnavailable,
    /// The protected operation itself failed
    OperationFailure,
    /// Filesystem failure during best-effort persistence
    Io,
    /// Encoding or decoding a persisted document failed
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::BreakerOpen => "breaker_open",
            ErrorKind::ProbeFailure => "probe_failure",
            ErrorKind::RecoveryFailure => "recovery_failure",
            ErrorKind::Configuration => "configuration",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::OperationFailure => "operation_failure",
            ErrorKind::Io => "io",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ResilienceError {
    #[error("{operation} timed out after {limit:?}")]
    DeadlineExceeded { operation: String, limit: Duration },

    #[error("Circuit breaker is open for {}; last failure at {}", dependency_label(.dependency), failure_label(.last_failure))]
    BreakerOpen {
        dependency: Option<DependencyId>,
        last_failure: Option<DateTime<Utc>>,
    },

    #[error("Health probe for '{dependency}' failed: {message}")]
    ProbeFailure {
        dependency: DependencyId,
        message: String,
    },

    #[error("Recovery of '{dependency}' failed: {message}")]
    RecoveryFailure {
        dependency: DependencyId,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown dependency: {0}")]
    UnknownDependency(DependencyId),

    #[error("Invalid dependency id '{name}': {reason}")]
    InvalidDependencyId { name: String, reason: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub(crate) fn dependency_label(dependency: &Option<DependencyId>) -> String {
    dependency
        .as_ref()
        .map(|d| format!("'{d}'"))
        .unwrap_or_else(|| "unnamed breaker".to_string())
}

fn failure_label(last_failure: &Option<DateTime<Utc>>) -> String {
    last_failure
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string())
}

impl ResilienceError {
    /// Tag under which this error is counted by the metrics store
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResilienceError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            ResilienceError::BreakerOpen { .. } => ErrorKind::BreakerOpen,
            ResilienceError::ProbeFailure { .. } => ErrorKind::ProbeFailure,
            ResilienceError::RecoveryFailure { .. } => ErrorKind::RecoveryFailure,
            ResilienceError::Configuration(_)
            | ResilienceError::UnknownDependency(_)
            | ResilienceError::InvalidDependencyId { .. } => ErrorKind::Configuration,
            ResilienceError::Io(_) => ErrorKind::Io,
            ResilienceError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// The dependency this error concerns, when there is one
    pub fn dependency(&self) -> Option<&DependencyId> {
        match self {
            ResilienceError::BreakerOpen { dependency, .. } => dependency.as_ref(),
            ResilienceError::ProbeFailure { dependency, .. }
            | ResilienceError::RecoveryFailure { dependency, .. }
            | ResilienceError::UnknownDependency(dependency) => Some(dependency),
            _ => None,
        }
    }
}

impl From<bulwark_config::ConfigError> for ResilienceError {
    fn from(err: bulwark_config::ConfigError) -> Self {
        ResilienceError::Configuration(err.to_string())
    }
}

pub type Result<T, E = ResilienceError> = std::result::Result<T, E>;
