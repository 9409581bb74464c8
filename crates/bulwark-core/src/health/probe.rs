//! Caller-supplied health probes and recovery actions

use async_trait::async_trait;
use bulwark_config::{RecoveryStrategy, ServicePolicyConfig};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::dependency::DependencyId;

/// Checks whether a dependency is currently usable
///
/// `Ok(false)` means unhealthy; `Err` means the probe itself raised, which is
/// recorded as a probe failure and also treated as unhealthy.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> anyhow::Result<bool>;
}

/// Attempts to bring a failed dependency back
///
/// `Ok(true)` means recovered. Both `Ok(false)` and `Err` count as a failed attempt.
#[async_trait]
pub trait RecoveryAction: Send + Sync {
    async fn recover(&self) -> anyhow::Result<bool>;
}

#[async_trait]
impl<F, Fut> HealthProbe for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    async fn check(&self) -> anyhow::Result<bool> {
        (self)().await
    }
}

#[async_trait]
impl<F, Fut> RecoveryAction for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    async fn recover(&self) -> anyhow::Result<bool> {
        (self)().await
    }
}

/// Everything needed to monitor one dependency
///
/// Fixed at registration, apart from the enabled flag which the checker owns
/// from then on.
#[derive(Clone)]
pub struct ServiceConfig {
    pub name: DependencyId,
    pub probe: Arc<dyn HealthProbe>,
    pub recovery: Arc<dyn RecoveryAction>,
    pub policy: ServicePolicyConfig,
}

impl ServiceConfig {
    pub fn new(
        name: DependencyId,
        probe: impl HealthProbe + 'static,
        recovery: impl RecoveryAction + 'static,
    ) -> Self {
        Self {
            name,
            probe: Arc::new(probe),
            recovery: Arc::new(recovery),
            policy: ServicePolicyConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: ServicePolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn strategy(mut self, strategy: RecoveryStrategy) -> Self {
        self.policy.strategy = strategy;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay_seconds = delay.as_secs();
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay_seconds = delay.as_secs();
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.policy.health_check_interval_seconds = interval.as_secs();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.policy.enabled = enabled;
        self
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
