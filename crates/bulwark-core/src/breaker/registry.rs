//! One breaker per named dependency

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::{BreakerConfig, BreakerError, BreakerStats, CircuitBreaker, CircuitState};
use crate::clock::SharedClock;
use crate::dependency::DependencyId;

/// Breakers keyed by dependency, created lazily with shared defaults
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<DependencyId, Arc<CircuitBreaker>>,
    defaults: BreakerConfig,
    clock: SharedClock,
}

impl BreakerRegistry {
    pub fn new(defaults: BreakerConfig, clock: SharedClock) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults,
            clock,
        }
    }

    pub fn defaults(&self) -> &BreakerConfig {
        &self.defaults
    }

    /// The breaker for `dependency`, created with the defaults on first use
    pub fn get_or_create(&self, dependency: &DependencyId) -> Arc<CircuitBreaker> {
        self.get_or_create_with(dependency, || self.defaults.clone())
    }

    /// Like [`get_or_create`](Self::get_or_create) with a config for a new breaker;
    /// an existing breaker keeps its own config
    pub fn get_or_create_with(
        &self,
        dependency: &DependencyId,
        config: impl FnOnce() -> BreakerConfig,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(dependency) {
            return existing.value().clone();
        }

        self.breakers
            .entry(dependency.clone())
            .or_insert_with(|| {
                debug!(dependency = %dependency, "Creating circuit breaker");
                Arc::new(CircuitBreaker::named(
                    dependency.clone(),
                    config(),
                    self.clock.clone(),
                ))
            })
            .value()
            .clone()
    }

    pub fn get(&self, dependency: &DependencyId) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(dependency).map(|b| b.value().clone())
    }

    /// Run `operation` through the breaker for `dependency`
    pub async fn call<F, Fut, T, E>(
        &self,
        dependency: &DependencyId,
        operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // Clone the Arc out so no map guard is held across the await
        let breaker = self.get_or_create(dependency);
        breaker.call(operation).await
    }

    /// Open the breaker for `dependency`, creating it if needed
    pub fn force_open(&self, dependency: &DependencyId) {
        self.get_or_create(dependency).force_open();
    }

    /// Reset the breaker for `dependency` if it exists
    pub fn reset(&self, dependency: &DependencyId) {
        if let Some(breaker) = self.get(dependency) {
            breaker.reset();
        }
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    pub fn all_stats(&self) -> BTreeMap<DependencyId, BreakerStats> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    /// Dependencies whose breaker is currently closed, sorted
    pub fn healthy_dependencies(&self) -> Vec<DependencyId> {
        self.in_state(CircuitState::Closed)
    }

    /// Dependencies whose breaker is currently open, sorted
    pub fn failed_dependencies(&self) -> Vec<DependencyId> {
        self.in_state(CircuitState::Open)
    }

    fn in_state(&self, state: CircuitState) -> Vec<DependencyId> {
        let mut names: Vec<DependencyId> = self
            .breakers
            .iter()
            .filter(|entry| entry.value().state() == state)
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
