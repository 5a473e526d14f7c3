pub mod http_registry;
pub mod static_registry;

use std::{sync::Arc, time::Duration};

use eyre::Result;
pub use http_registry::HttpRegistry;
pub use static_registry::StaticRegistry;

use crate::{config::models::RegistryConfig, ports::discovery::DiscoveryRegistry};

/// Build the registry described by `config`.
pub fn registry_from_config(
    config: &RegistryConfig,
    query_timeout: Duration,
) -> Result<Arc<dyn DiscoveryRegistry>> {
    match config {
        RegistryConfig::Static { services } => {
            tracing::info!(services = services.len(), "Using static discovery registry");
            Ok(Arc::new(StaticRegistry::from_config(services)))
        }
        RegistryConfig::Http { base_url } => {
            tracing::info!(base_url = %base_url, "Using HTTP discovery registry");
            Ok(Arc::new(HttpRegistry::new(base_url.as_str(), query_timeout)?))
        }
    }
}
