use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    config::models::StaticInstanceConfig,
    core::instance::ServiceInstance,
    ports::discovery::{DiscoveryRegistry, DiscoveryResult},
};

/// Registry backed by the instance lists written in the configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    services: HashMap<String, Vec<ServiceInstance>>,
}

impl StaticRegistry {
    pub fn new(services: HashMap<String, Vec<ServiceInstance>>) -> Self {
        Self { services }
    }

    pub fn from_config(services: &HashMap<String, Vec<StaticInstanceConfig>>) -> Self {
        let services = services
            .iter()
            .map(|(name, instances)| {
                let instances = instances.iter().map(|i| i.to_instance(name)).collect();
                (name.clone(), instances)
            })
            .collect();
        Self { services }
    }
}

#[async_trait]
impl DiscoveryRegistry for StaticRegistry {
    async fn list_services(&self) -> DiscoveryResult<Vec<String>> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get_instances(&self, service: &str) -> DiscoveryResult<Vec<ServiceInstance>> {
        Ok(self.services.get(service).cloned().unwrap_or_default())
    }
}
