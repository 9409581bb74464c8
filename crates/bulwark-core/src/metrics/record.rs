//! Records kept by the metrics store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::dependency::DependencyId;
use crate::error::{ErrorKind, ResilienceError, Severity};

/// One recorded failure
///
/// Immutable once appended, except for the two recovery flags which
/// `record_recovery_attempt` may back-fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: ErrorKind,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<DependencyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub recovery_attempted: bool,
    #[serde(default)]
    pub recovery_succeeded: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
}

impl ErrorRecord {
    /// Dependency this record counts against
    ///
    /// A breaker fast-fail names its dependency but no call ran, so it counts
    /// against nothing.
    pub fn charged_dependency(&self) -> Option<&DependencyId> {
        match self.kind {
            ErrorKind::BreakerOpen => None,
            _ => self.dependency.as_ref(),
        }
    }
}

/// A failure about to be recorded
///
/// ```
/// use bulwark_core::{DependencyId, ErrorEvent, ErrorKind, Severity};
///
/// let dep = DependencyId::parse("analyzer").unwrap();
/// let event = ErrorEvent::new(ErrorKind::ServiceUnavailable, "connection refused")
///     .severity(Severity::High)
///     .dependency(&dep)
///     .context("operation", "analyze");
/// assert_eq!(event.kind, ErrorKind::ServiceUnavailable);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
    pub severity: Severity,
    pub dependency: Option<DependencyId>,
    pub correlation_id: Option<String>,
    pub context: BTreeMap<String, Value>,
}

impl ErrorEvent {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            severity: Severity::default(),
            dependency: None,
            correlation_id: None,
            context: BTreeMap::new(),
        }
    }

    /// Event for a crate error, tagged with its kind and dependency
    pub fn from_error(error: &ResilienceError) -> Self {
        let mut event = Self::new(error.kind(), error.to_string());
        event.dependency = error.dependency().cloned();
        event
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn dependency(mut self, dependency: &DependencyId) -> Self {
        self.dependency = Some(dependency.clone());
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub(crate) fn into_record(self, timestamp: DateTime<Utc>) -> ErrorRecord {
        ErrorRecord {
            timestamp,
            kind: self.kind,
            message: self.message,
            severity: self.severity,
            dependency: self.dependency,
            correlation_id: self.correlation_id,
            recovery_attempted: false,
            recovery_succeeded: false,
            context: self.context,
        }
    }
}

/// A span during which a dependency was failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DowntimeInterval {
    pub dependency: DependencyId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl DowntimeInterval {
    pub fn new(dependency: DependencyId, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let duration_seconds = (end - start).num_milliseconds().max(0) as f64 / 1000.0;
        Self {
            dependency,
            start,
            end,
            duration_seconds,
        }
    }
}

/// Global recovery counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub attempts: u64,
    pub successful: u64,
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
}

impl RecoveryStats {
    /// Successful / attempted, 1.0 when nothing was attempted
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            1.0
        } else {
            self.successful as f64 / self.attempts as f64
        }
    }
}
