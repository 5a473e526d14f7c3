//! Configuration data structures for Switchyard.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files. They are
//! serde-friendly and include defaults so that minimal configs remain concise.
//! Builders and enums here are considered part of the public API for embedding.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::core::instance::ServiceInstance;

fn default_true() -> bool {
    true
}

fn default_forward_timeout() -> String {
    "30s".to_string()
}

fn default_connect_timeout() -> String {
    "5s".to_string()
}

fn default_discovery_timeout() -> String {
    "2s".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_admin_prefix() -> String {
    "/__switchyard".to_string()
}

/// Parse a humantime duration such as `"30s"` or `"1m 30s"`.
pub fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value.trim())
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HeaderCondition {
    pub name: String,
    #[serde(default)]
    pub value_matches: Option<String>, // Regex the whole header value must match
}

/// A single regex-based path rewrite.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RewriteConfig {
    pub pattern: String,
    pub replacement: String,
}

/// One entry of the ordered `routes` list.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RouteConfig {
    pub id: String,
    #[serde(default = "RouteConfig::default_path")]
    pub path: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Vec<HeaderCondition>,
    #[serde(default)]
    pub rewrite: Vec<RewriteConfig>,
    /// `http(s)://host:port[/base]` or `lb://service-name`
    pub target: String,
}

impl RouteConfig {
    /// Pattern matching every path.
    pub fn default_path() -> String {
        "/**".to_string()
    }

    pub fn new(id: impl Into<String>, path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            method: None,
            headers: Vec::new(),
            rewrite: Vec::new(),
            target: target.into(),
        }
    }

    pub fn uses_discovery(&self) -> bool {
        self.target.starts_with("lb://")
    }
}

/// Outbound request behaviour.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ForwardConfig {
    /// Bound on connect plus response head, e.g. "30s"
    #[serde(default = "default_forward_timeout")]
    pub timeout: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
    #[serde(default = "default_true")]
    pub forwarded_headers: bool,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            timeout: default_forward_timeout(),
            connect_timeout: default_connect_timeout(),
            forwarded_headers: true,
        }
    }
}

impl ForwardConfig {
    pub fn timeout(&self) -> Result<Duration, humantime::DurationError> {
        parse_duration(&self.timeout)
    }

    pub fn connect_timeout(&self) -> Result<Duration, humantime::DurationError> {
        parse_duration(&self.connect_timeout)
    }
}

/// How one instance is chosen out of a discovered list.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    RoundRobin,
    First,
    Random,
}

/// Instance entry of a static registry.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StaticInstanceConfig {
    #[serde(default, alias = "instanceId")]
    pub instance_id: Option<String>,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StaticInstanceConfig {
    pub fn to_instance(&self, service_id: &str) -> ServiceInstance {
        ServiceInstance {
            service_id: service_id.to_string(),
            instance_id: self.instance_id.clone(),
            host: self.host.clone(),
            port: self.port,
            secure: self.secure,
            metadata: self.metadata.clone(),
        }
    }
}

/// Where discovered instances come from.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryConfig {
    Static {
        #[serde(default)]
        services: HashMap<String, Vec<StaticInstanceConfig>>,
    },
    Http {
        base_url: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub selection: SelectionPolicy,
    /// Bound on each registry query
    #[serde(default = "default_discovery_timeout")]
    pub timeout: String,
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            selection: SelectionPolicy::default(),
            timeout: default_discovery_timeout(),
            registry: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Result<Duration, humantime::DurationError> {
        parse_duration(&self.timeout)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Local introspection endpoints.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_admin_prefix")]
    pub path_prefix: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path_prefix: default_admin_prefix(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    #[serde(default)]
    pub forward: ForwardConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    /// Evaluated in declaration order; first match wins
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    pub fn uses_discovery(&self) -> bool {
        self.routes.iter().any(RouteConfig::uses_discovery)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            forward: ForwardConfig::default(),
            discovery: DiscoveryConfig::default(),
            logging: LoggingConfig::default(),
            admin: AdminConfig::default(),
            routes: Vec::new(),
        }
    }
}

/// Builder for ServerConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ServerConfigBuilder {
    listen_addr: Option<String>,
    forward: Option<ForwardConfig>,
    discovery: Option<DiscoveryConfig>,
    logging: Option<LoggingConfig>,
    admin: Option<AdminConfig>,
    routes: Vec<RouteConfig>,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    pub fn forward(mut self, config: ForwardConfig) -> Self {
        self.forward = Some(config);
        self
    }

    pub fn discovery(mut self, config: DiscoveryConfig) -> Self {
        self.discovery = Some(config);
        self
    }

    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    pub fn admin(mut self, config: AdminConfig) -> Self {
        self.admin = Some(config);
        self
    }

    /// Append a route; declaration order is evaluation order
    pub fn route(mut self, config: RouteConfig) -> Self {
        self.routes.push(config);
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        let listen_addr = self
            .listen_addr
            .ok_or_else(|| "listen_addr is required".to_string())?;

        if self.routes.is_empty() {
            return Err("At least one route must be configured".to_string());
        }

        Ok(ServerConfig {
            listen_addr,
            forward: self.forward.unwrap_or_default(),
            discovery: self.discovery.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            admin: self.admin.unwrap_or_default(),
            routes: self.routes,
        })
    }
}
