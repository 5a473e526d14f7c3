use std::path::PathBuf;

use async_trait::async_trait;
use eyre::{Context, Result};

use crate::{
    config::{loader::load_config_with_env, models::ServerConfig},
    ports::config_provider::ConfigProvider,
};

/// Configuration provider that loads a local YAML/JSON/TOML file once.
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn load_config(&self) -> Result<ServerConfig> {
        let path = self
            .path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", self.path.display()))?
            .to_string();

        // The config crate reads files synchronously
        tokio::task::spawn_blocking(move || load_config_with_env(&path, None))
            .await
            .wrap_err("Config loading task failed")?
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }
}
