use std::path::Path;

use config::{Config, Environment, File, FileFormat, Map};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix of environment variables overriding file values,
/// e.g. `SWITCHYARD__FORWARD__TIMEOUT=10s`.
pub const ENV_PREFIX: &str = "SWITCHYARD";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<ServerConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously, applying environment overrides
pub fn load_config_sync(config_path: &str) -> Result<ServerConfig> {
    load_config_with_env(config_path, None)
}

/// Load configuration with an explicit environment snapshot.
///
/// `None` reads the process environment.
pub fn load_config_with_env(
    config_path: &str,
    env: Option<Map<String, String>>,
) -> Result<ServerConfig> {
    let config_path = Path::new(config_path);
    let path = config_path
        .to_str()
        .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?;

    let settings = Config::builder()
        .add_source(File::new(path, format_for_path(config_path)))
        .add_source(environment(env))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })
}

/// Parse configuration from an in-memory document (used for remote sources).
pub fn load_config_from_str(
    content: &str,
    format: FileFormat,
    env: Option<Map<String, String>>,
) -> Result<ServerConfig> {
    let settings = Config::builder()
        .add_source(File::from_str(content, format))
        .add_source(environment(env))
        .build()
        .wrap_err("Failed to build config from document")?;

    settings
        .try_deserialize()
        .wrap_err("Failed to deserialize config document")
}

/// Determine file format based on extension
fn format_for_path(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml, // Default to YAML
    }
}

fn environment(env: Option<Map<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .source(env)
}

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::models::{RegistryConfig, SelectionPolicy};

    const YAML_CONFIG: &str = r#"
listen_addr: "127.0.0.1:3000"
discovery:
  selection: round_robin
  registry:
    kind: static
    services:
      address-service:
        - host: "10.0.0.1"
          port: 8080
routes:
  - id: person
    path: /person/**
    rewrite:
      - pattern: "/person/(?<segment>.*)"
        replacement: "/${segment}"
    target: "http://person-service:8080"
  - id: address
    path: /address/**
    target: "lb://address-service"
"#;

    #[tokio::test]
    async fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", YAML_CONFIG).unwrap();

        let config = load_config_with_env(temp_file.path().to_str().unwrap(), Some(Map::new()))
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[0].id, "person");
        assert_eq!(config.routes[1].target, "lb://address-service");
        assert_eq!(config.discovery.selection, SelectionPolicy::RoundRobin);
        assert!(matches!(
            config.discovery.registry,
            Some(RegistryConfig::Static { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let json_content = r#"
{
  "listen_addr": "127.0.0.1:3000",
  "forward": { "timeout": "10s" },
  "routes": [
    { "id": "api", "path": "/api/**", "target": "http://backend:8080" }
  ]
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.forward.timeout().unwrap(), Duration::from_secs(10));
        assert!(config.forward.forwarded_headers);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", YAML_CONFIG).unwrap();

        let env = Map::from([
            ("SWITCHYARD__LISTEN_ADDR".to_string(), "0.0.0.0:9000".to_string()),
            ("SWITCHYARD__FORWARD__TIMEOUT".to_string(), "5s".to_string()),
        ]);
        let config = load_config_with_env(temp_file.path().to_str().unwrap(), Some(env)).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.forward.timeout().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_config_sync("/nonexistent/switchyard.yaml").is_err());
    }
}
