use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::{
    core::instance::ServiceInstance,
    ports::discovery::{DiscoveryError, DiscoveryRegistry, DiscoveryResult},
};

/// Registry client speaking a minimal JSON API:
///
/// * `GET {base_url}/services` returns `["person-service", ...]`
/// * `GET {base_url}/instances/{name}` returns a list of instances
///
/// An unknown service may answer 404, which is treated as "no instances".
pub struct HttpRegistry {
    base_url: String,
    client: Client,
}

impl HttpRegistry {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .wrap_err("Failed to build discovery HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> DiscoveryResult<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Unavailable(format!("GET {url}: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(DiscoveryError::Unavailable(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| DiscoveryError::InvalidResponse(format!("GET {url}: {e}")))
    }
}

#[async_trait]
impl DiscoveryRegistry for HttpRegistry {
    async fn list_services(&self) -> DiscoveryResult<Vec<String>> {
        Ok(self.get_json("/services").await?.unwrap_or_default())
    }

    async fn get_instances(&self, service: &str) -> DiscoveryResult<Vec<ServiceInstance>> {
        let mut instances: Vec<ServiceInstance> = self
            .get_json(&format!("/instances/{service}"))
            .await?
            .unwrap_or_default();
        // Some registries omit the service id on each entry
        for instance in &mut instances {
            if instance.service_id.is_empty() {
                instance.service_id = service.to_string();
            }
        }
        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, extract::Path, http::StatusCode, routing::get};
    use tokio::net::TcpListener;

    use super::*;

    async fn spawn_registry() -> String {
        let app = Router::new()
            .route(
                "/services",
                get(|| async { Json(vec!["address-service", "person-service"]) }),
            )
            .route(
                "/instances/{name}",
                get(|Path(name): Path<String>| async move {
                    if name == "address-service" {
                        Ok(Json(serde_json::json!([
                            {"serviceId": "address-service", "instanceId": "a-1", "host": "10.0.0.1", "port": 8080},
                            {"serviceId": "", "host": "10.0.0.2", "port": 8443, "secure": true},
                            {"host": "10.0.0.3", "port": 8080}
                        ])))
                    } else {
                        Err(StatusCode::NOT_FOUND)
                    }
                }),
            )
            .route("/broken/services", get(|| async { "not json" }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_http_registry_lookup() {
        let base = spawn_registry().await;
        let registry = HttpRegistry::new(format!("{base}/"), Duration::from_secs(2)).unwrap();

        assert_eq!(
            registry.list_services().await.unwrap(),
            vec!["address-service", "person-service"]
        );

        let instances = registry.get_instances("address-service").await.unwrap();
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[0].instance_id.as_deref(), Some("a-1"));
        assert_eq!(instances[1].service_id, "address-service");
        assert_eq!(instances[1].base_uri(), "https://10.0.0.2:8443");
        // No service id key at all
        assert_eq!(instances[2].service_id, "address-service");
        assert_eq!(instances[2].base_uri(), "http://10.0.0.3:8080");

        assert!(registry.get_instances("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_registry_errors() {
        let base = spawn_registry().await;
        let broken = HttpRegistry::new(format!("{base}/broken"), Duration::from_secs(2)).unwrap();
        assert!(matches!(
            broken.list_services().await,
            Err(DiscoveryError::InvalidResponse(_))
        ));

        let unreachable =
            HttpRegistry::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            unreachable.get_instances("address-service").await,
            Err(DiscoveryError::Unavailable(_))
        ));
    }
}
