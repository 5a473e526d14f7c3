use std::{collections::HashSet, net::SocketAddr};

use crate::{
    config::models::{
        AdminConfig, DiscoveryConfig, ForwardConfig, LoggingConfig, RegistryConfig, RouteConfig,
        ServerConfig, parse_duration,
    },
    core::route::RouteRule,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid route '{id}': {message}")]
    InvalidRoute { id: String, message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, collecting every problem
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        } else {
            errors.extend(Self::validate_routes(&config.routes));
        }

        errors.extend(Self::validate_forward(&config.forward));
        errors.extend(Self::validate_discovery(&config.discovery, config.uses_discovery()));
        errors.extend(Self::validate_logging(&config.logging));
        errors.extend(Self::validate_admin(&config.admin, &config.routes));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Compile every route the way the server will at startup
    fn validate_routes(routes: &[RouteConfig]) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for (index, route) in routes.iter().enumerate() {
            let id = if route.id.trim().is_empty() {
                format!("#{}", index + 1)
            } else {
                route.id.clone()
            };

            if !route.id.trim().is_empty() && !seen.insert(route.id.as_str()) {
                errors.push(ValidationError::InvalidRoute {
                    id: id.clone(),
                    message: "duplicate route id".to_string(),
                });
            }

            if let Err(e) = RouteRule::from_config(route) {
                errors.push(ValidationError::InvalidRoute {
                    id,
                    message: Self::describe_route_error(&e),
                });
            }
        }

        errors
    }

    /// Innermost cause of a route compilation error, without the route id prefix
    fn describe_route_error(error: &crate::core::error::RouteConfigError) -> String {
        match error {
            crate::core::error::RouteConfigError::InRoute { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }

    fn validate_duration(field: &str, value: &str) -> Option<ValidationError> {
        match parse_duration(value) {
            Ok(d) if d.is_zero() => Some(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Duration must be greater than zero".to_string(),
            }),
            Ok(_) => None,
            Err(e) => Some(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Invalid duration '{value}': {e}"),
            }),
        }
    }

    fn validate_forward(config: &ForwardConfig) -> Vec<ValidationError> {
        [
            Self::validate_duration("forward.timeout", &config.timeout),
            Self::validate_duration("forward.connect_timeout", &config.connect_timeout),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn validate_discovery(config: &DiscoveryConfig, required: bool) -> Vec<ValidationError> {
        let mut errors: Vec<ValidationError> =
            Self::validate_duration("discovery.timeout", &config.timeout)
                .into_iter()
                .collect();

        match &config.registry {
            None if required => errors.push(ValidationError::MissingField {
                field: "discovery.registry (required by lb:// route targets)".to_string(),
            }),
            Some(RegistryConfig::Http { base_url }) => {
                if let Err(e) = Self::validate_url(base_url, "discovery.registry.base_url") {
                    errors.push(e);
                }
            }
            Some(RegistryConfig::Static { services }) => {
                for (service, instances) in services {
                    for (i, instance) in instances.iter().enumerate() {
                        if instance.host.trim().is_empty() {
                            errors.push(ValidationError::InvalidField {
                                field: format!("discovery.registry.services.{service}[{i}].host"),
                                message: "Host cannot be empty".to_string(),
                            });
                        }
                        if instance.port == 0 {
                            errors.push(ValidationError::InvalidField {
                                field: format!("discovery.registry.services.{service}[{i}].port"),
                                message: "Port must be greater than zero".to_string(),
                            });
                        }
                    }
                }
            }
            None => {}
        }

        errors
    }

    fn validate_logging(config: &LoggingConfig) -> Vec<ValidationError> {
        match tracing_subscriber::EnvFilter::try_new(&config.level) {
            Ok(_) => Vec::new(),
            Err(e) => vec![ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: e.to_string(),
            }],
        }
    }

    fn validate_admin(config: &AdminConfig, routes: &[RouteConfig]) -> Vec<ValidationError> {
        if !config.enabled {
            return Vec::new();
        }
        let prefix = &config.path_prefix;
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return vec![ValidationError::InvalidField {
                field: "admin.path_prefix".to_string(),
                message: format!(
                    "'{prefix}' must start with '/', must not end with '/' and cannot be the root"
                ),
            }];
        }

        // Admin requests are answered before route matching
        routes
            .iter()
            .filter(|route| {
                let literal = Self::literal_path_prefix(&route.path);
                literal == *prefix
                    || literal
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .map(|route| ValidationError::InvalidRoute {
                id: route.id.clone(),
                message: format!(
                    "path '{}' is shadowed by the admin surface at '{prefix}'",
                    route.path
                ),
            })
            .collect()
    }

    /// Leading segments of a path pattern that contain no wildcard or variable.
    fn literal_path_prefix(pattern: &str) -> String {
        let literal: Vec<&str> = pattern
            .split('/')
            .filter(|segment| !segment.is_empty())
            .take_while(|segment| !segment.contains(['*', '?', '{']))
            .collect();
        format!("/{}", literal.join("/"))
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        let url = url::Url::parse(url_str).map_err(|e| ValidationError::InvalidField {
            field: context.to_string(),
            message: format!("Invalid URL '{url_str}': {e}"),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("URL scheme must be http or https, got '{}'", url.scheme()),
            });
        }
        if url.host().is_none() {
            return Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("URL '{url_str}' must include a host"),
            });
        }
        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
