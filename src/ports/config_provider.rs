use async_trait::async_trait;
use eyre::Result;

use crate::config::models::ServerConfig;

/// Trait for configuration providers. The configuration is loaded once before
/// serving begins and treated as immutable afterwards.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Load the configuration.
    async fn load_config(&self) -> Result<ServerConfig>;

    /// Human readable origin of the configuration, used in logs.
    fn source(&self) -> String;
}
