// Loading a YAML document from disk and building a live handler from it
#[cfg(test)]
mod test {
    use std::{io::Write, time::Duration};

    use switchyard::{
        HttpHandler,
        config::{
            ServerConfigValidator,
            loader::load_config_with_env,
            models::{RegistryConfig, SelectionPolicy},
        },
    };

    const GATEWAY_YAML: &str = r#"
listen_addr: "127.0.0.1:0"
forward:
  timeout: "10s"
discovery:
  selection: first
  registry:
    kind: static
    services:
      address-service:
        - host: "10.0.0.1"
          port: 8080
        - host: "10.0.0.2"
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

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_yaml_config_builds_handler() {
        let file = write_config(GATEWAY_YAML);
        let config =
            load_config_with_env(file.path().to_str().unwrap(), Some(Default::default())).unwrap();

        ServerConfigValidator::validate(&config).unwrap();
        assert_eq!(config.forward.timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(config.forward.connect_timeout().unwrap(), Duration::from_secs(5));
        assert_eq!(config.discovery.selection, SelectionPolicy::First);
        match &config.discovery.registry {
            Some(RegistryConfig::Static { services }) => {
                assert_eq!(services["address-service"].len(), 2);
            }
            other => panic!("unexpected registry: {other:?}"),
        }

        let handler = HttpHandler::from_config(&config).unwrap();
        let ids: Vec<_> = handler.engine().routes().iter().map(|r| r.id()).collect();
        assert_eq!(ids, ["person", "address"]);
    }

    #[test]
    fn test_environment_overrides_forward_timeout() {
        let file = write_config(GATEWAY_YAML);
        let env = [("SWITCHYARD__FORWARD__TIMEOUT".to_string(), "3s".to_string())]
            .into_iter()
            .collect();

        let config = load_config_with_env(file.path().to_str().unwrap(), Some(env)).unwrap();
        assert_eq!(config.forward.timeout().unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn test_discovery_route_without_registry_is_rejected() {
        let file = write_config(
            r#"
listen_addr: "127.0.0.1:0"
routes:
  - id: address
    path: /address/**
    target: "lb://address-service"
"#,
        );
        let config =
            load_config_with_env(file.path().to_str().unwrap(), Some(Default::default())).unwrap();

        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("registry"), "{err}");
    }

    #[test]
    fn test_bad_rewrite_regex_is_rejected() {
        let file = write_config(
            r#"
listen_addr: "127.0.0.1:0"
routes:
  - id: broken
    path: /broken/**
    rewrite:
      - pattern: "/broken/(?<segment"
        replacement: "/${segment}"
    target: "http://broken:8080"
"#,
        );
        let config =
            load_config_with_env(file.path().to_str().unwrap(), Some(Default::default())).unwrap();

        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("broken"), "{err}");
    }
}
