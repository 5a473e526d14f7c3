use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rand::Rng;
use scc::HashMap;

use crate::{config::SelectionPolicy, core::instance::ServiceInstance};

/// Trait defining how one instance is picked out of a registry listing
#[async_trait]
pub trait SelectionStrategy: Send + Sync + 'static {
    /// Select an instance of `service` from `instances`
    async fn select<'a>(
        &self,
        service: &str,
        instances: &'a [ServiceInstance],
    ) -> Option<&'a ServiceInstance>;

    /// Create a new instance of this strategy as a boxed trait object
    fn boxed(self) -> Box<dyn SelectionStrategy>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

/// Round-robin selection with an independent cursor per service name
pub struct RoundRobinStrategy {
    counters: HashMap<String, AtomicUsize>,
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinStrategy {
    /// Create a new round-robin strategy
    pub fn new() -> Self {
        Self {
            counters: HashMap::new(),
        }
    }
}

#[async_trait]
impl SelectionStrategy for RoundRobinStrategy {
    async fn select<'a>(
        &self,
        service: &str,
        instances: &'a [ServiceInstance],
    ) -> Option<&'a ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let count = if let Some(entry) = self.counters.get_async(service).await {
            entry.get().fetch_add(1, Ordering::Relaxed)
        } else {
            let entry = self
                .counters
                .entry_async(service.to_string())
                .await
                .or_insert_with(|| AtomicUsize::new(0));
            entry.get().fetch_add(1, Ordering::Relaxed)
        };
        instances.get(count % instances.len())
    }
}

/// Always the first instance of the listing
pub struct FirstStrategy;

#[async_trait]
impl SelectionStrategy for FirstStrategy {
    async fn select<'a>(
        &self,
        _service: &str,
        instances: &'a [ServiceInstance],
    ) -> Option<&'a ServiceInstance> {
        instances.first()
    }
}

/// Random selection
pub struct RandomStrategy;

#[async_trait]
impl SelectionStrategy for RandomStrategy {
    async fn select<'a>(
        &self,
        _service: &str,
        instances: &'a [ServiceInstance],
    ) -> Option<&'a ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..instances.len());
        instances.get(index)
    }
}

/// Factory for creating selection strategies from configuration
pub struct LoadBalancerFactory;

impl LoadBalancerFactory {
    pub fn create_strategy(policy: &SelectionPolicy) -> Box<dyn SelectionStrategy> {
        match policy {
            SelectionPolicy::RoundRobin => RoundRobinStrategy::new().boxed(),
            SelectionPolicy::First => FirstStrategy.boxed(),
            SelectionPolicy::Random => RandomStrategy.boxed(),
        }
    }
}
