//! Typed dependency handles
//!
//! Every breaker, health checker and metrics entry is keyed by a
//! [`DependencyId`]. Names are validated once, on construction, so a typo
//! surfaces where the handle is created rather than as a silently separate
//! entry in some map.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::error::ResilienceError;

const MAX_LEN: usize = 128;

/// Name of a protected dependency
///
/// Allowed characters: ASCII alphanumerics and `_ . : -`, at most 128 bytes.
/// Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyId(Arc<str>);

impl Serialize for DependencyId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

// Custom Deserialize so persisted documents cannot bypass validation
impl<'de> Deserialize<'de> for DependencyId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DependencyId::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl DependencyId {
    /// Parse and validate a dependency name
    pub fn parse(name: &str) -> Result<Self, ResilienceError> {
        if name.is_empty() {
            return Err(ResilienceError::InvalidDependencyId {
                name: name.to_string(),
                reason: "name is empty",
            });
        }
        if name.len() > MAX_LEN {
            return Err(ResilienceError::InvalidDependencyId {
                name: name.to_string(),
                reason: "name is longer than 128 bytes",
            });
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
        {
            return Err(ResilienceError::InvalidDependencyId {
                name: name.to_string(),
                reason: "name contains characters outside [A-Za-z0-9_.:-]",
            });
        }
        Ok(Self(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DependencyId {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for DependencyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
