use async_trait::async_trait;
use thiserror::Error;

use crate::core::instance::ServiceInstance;

/// Errors reported by a discovery registry.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The registry could not be reached
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// The registry answered with something that is not a service listing
    #[error("invalid registry response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for discovery operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// DiscoveryRegistry defines the port for looking up live service instances.
///
/// The gateway only consumes these two read operations and never caches their
/// results between requests.
#[async_trait]
pub trait DiscoveryRegistry: Send + Sync + 'static {
    /// Names of all services known to the registry
    async fn list_services(&self) -> DiscoveryResult<Vec<String>>;

    /// Live instances of `service`; an unknown service yields an empty list
    async fn get_instances(&self, service: &str) -> DiscoveryResult<Vec<ServiceInstance>>;
}
