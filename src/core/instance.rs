use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

/// A live instance of a logical service as reported by a discovery registry.
///
/// Instances are owned by the registry; the gateway only ever holds the copy
/// returned by the most recent lookup for the request being served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Logical service name, e.g. `address-service`
    #[serde(default, alias = "serviceId")]
    pub service_id: String,
    /// Registry specific identifier (pod name, instance uuid ...)
    #[serde(default, alias = "instanceId", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub host: String,
    pub port: u16,
    /// Whether the instance expects TLS
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    pub fn new(service_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            service_id: service_id.into(),
            instance_id: None,
            host: host.into(),
            port,
            secure: false,
            metadata: HashMap::new(),
        }
    }

    /// `https` for secure instances, `http` otherwise.
    pub fn scheme(&self) -> &'static str {
        if self.secure { "https" } else { "http" }
    }

    /// Base URI (`scheme://host:port`) requests for this instance are sent to.
    pub fn base_uri(&self) -> String {
        if self.host.contains(':') {
            // IPv6 literal
            format!("{}://[{}]:{}", self.scheme(), self.host, self.port)
        } else {
            format!("{}://{}:{}", self.scheme(), self.host, self.port)
        }
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.service_id, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_uri() {
        let instance = ServiceInstance::new("address-service", "10.0.0.1", 8080);
        assert_eq!(instance.base_uri(), "http://10.0.0.1:8080");

        let mut secure = ServiceInstance::new("address-service", "::1", 8443);
        secure.secure = true;
        assert_eq!(secure.base_uri(), "https://[::1]:8443");
    }

    #[test]
    fn test_deserialize_registry_aliases() {
        let json = r#"{
            "serviceId": "person-service",
            "instanceId": "person-7d9f",
            "host": "10.1.2.3",
            "port": 8080,
            "secure": false,
            "metadata": {"zone": "a"},
            "uri": "http://10.1.2.3:8080"
        }"#;

        let instance: ServiceInstance = serde_json::from_str(json).unwrap();
        assert_eq!(instance.service_id, "person-service");
        assert_eq!(instance.instance_id.as_deref(), Some("person-7d9f"));
        assert_eq!(instance.metadata.get("zone").map(String::as_str), Some("a"));
    }

    #[test]
    fn test_deserialize_without_service_id() {
        let instance: ServiceInstance =
            serde_json::from_str(r#"{"host": "10.0.0.9", "port": 8080}"#).unwrap();
        assert!(instance.service_id.is_empty());
        assert_eq!(instance.base_uri(), "http://10.0.0.9:8080");
    }
}
