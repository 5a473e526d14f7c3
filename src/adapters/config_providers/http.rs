use std::time::Duration;

use async_trait::async_trait;
use config::FileFormat;
use eyre::{Context, Result};
use reqwest::Client;

use crate::{
    config::{loader::load_config_from_str, models::ServerConfig},
    ports::config_provider::ConfigProvider,
};

/// Configuration provider that fetches a JSON document from a config server
/// once at startup.
pub struct HttpConfigProvider {
    url: String,
    client: Client,
}

impl HttpConfigProvider {
    pub fn new(url: impl Into<String>, fetch_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(fetch_timeout)
            .build()
            .wrap_err("Failed to build config HTTP client")?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    async fn fetch_config(&self) -> Result<ServerConfig> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to send request")?
            .error_for_status()
            .context("Config server returned an error status")?
            .text()
            .await
            .context("Failed to read config response")?;

        // Same environment overrides as file based configs
        load_config_from_str(&body, FileFormat::Json, None)
            .with_context(|| format!("Failed to parse JSON config from {}", self.url))
    }
}

#[async_trait]
impl ConfigProvider for HttpConfigProvider {
    async fn load_config(&self) -> Result<ServerConfig> {
        self.fetch_config().await
    }

    fn source(&self) -> String {
        self.url.clone()
    }
}
