//! Target resolution: turning a route target into the base
//! URI of a concrete upstream.
//!
//! Static targets resolve to their configured URI unchanged. Discovered
//! targets (`lb://service`) query the discovery registry on every call and
//! pick one instance using the configured [`SelectionStrategy`].
use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use hyper::{Uri, http::uri::PathAndQuery};
use thiserror::Error;

use crate::{
    core::{error::RouteConfigError, instance::ServiceInstance, load_balancer::SelectionStrategy},
    ports::discovery::{DiscoveryError, DiscoveryRegistry},
};

const DISCOVERY_SCHEME: &str = "lb://";

/// Where a route sends its traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// Literal base URI such as `http://person-service:8080`
    Static(Uri),
    /// Logical service name resolved through the discovery registry
    Discovered(String),
}

impl TargetSpec {
    pub fn parse(target: &str) -> Result<Self, RouteConfigError> {
        let invalid = |reason: &str| RouteConfigError::InvalidTarget {
            target: target.to_string(),
            reason: reason.to_string(),
        };

        if let Some(service) = target.strip_prefix(DISCOVERY_SCHEME) {
            let service = service.trim_end_matches('/');
            if service.is_empty() {
                return Err(invalid("missing service name"));
            }
            if service.contains('/') {
                return Err(invalid("service name must not contain a path"));
            }
            return Ok(TargetSpec::Discovered(service.to_string()));
        }

        let url = url::Url::parse(target).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid("scheme must be 'http', 'https' or 'lb'"));
        }
        if url.host().is_none() {
            return Err(invalid("missing host"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed"));
        }

        let uri = Uri::from_str(target).map_err(|e| invalid(&e.to_string()))?;
        Ok(TargetSpec::Static(uri))
    }

    pub fn is_discovered(&self) -> bool {
        matches!(self, TargetSpec::Discovered(_))
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::Static(uri) => write!(f, "{uri}"),
            TargetSpec::Discovered(service) => write!(f, "{DISCOVERY_SCHEME}{service}"),
        }
    }
}

/// Resolution failures. All of them surface to callers as "no instance available".
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("no instances available for service '{service}'")]
    NoInstanceAvailable { service: String },

    #[error("discovery lookup for service '{service}' failed: {source}")]
    Discovery {
        service: String,
        #[source]
        source: DiscoveryError,
    },

    #[error("discovery lookup for service '{service}' timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("service '{service}' requires discovery but no registry is configured")]
    NoRegistry { service: String },

    #[error("instance {instance} has an unusable address: {reason}")]
    InvalidInstance { instance: String, reason: String },
}

/// A concrete upstream picked for one request.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    base: Uri,
    instance: Option<ServiceInstance>,
}

impl ResolvedTarget {
    /// Base URI as configured (static) or built from the instance (discovered).
    pub fn uri(&self) -> &Uri {
        &self.base
    }

    /// The discovery instance this target came from, if any.
    pub fn instance(&self) -> Option<&ServiceInstance> {
        self.instance.as_ref()
    }

    pub fn host(&self) -> &str {
        self.base.host().unwrap_or_default()
    }

    /// Explicit port, or the scheme's default.
    pub fn port(&self) -> u16 {
        self.base.port_u16().unwrap_or_else(|| {
            if self.base.scheme_str() == Some("https") {
                443
            } else {
                80
            }
        })
    }

    /// Join the base URI with a rewritten path and the original query.
    ///
    /// A non-root base path is kept as a prefix of `path`.
    pub fn join(&self, path: &str, query: Option<&str>) -> Result<Uri, hyper::http::Error> {
        let base_path = self.base.path().trim_end_matches('/');
        let mut path_and_query = String::with_capacity(base_path.len() + path.len());
        path_and_query.push_str(base_path);
        path_and_query.push_str(path);
        if let Some(query) = query {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }
        let path_and_query = PathAndQuery::from_str(&path_and_query)?;

        let mut parts = hyper::http::uri::Parts::default();
        parts.scheme = self.base.scheme().cloned();
        parts.authority = self.base.authority().cloned();
        parts.path_and_query = Some(path_and_query);
        Ok(Uri::from_parts(parts)?)
    }
}

impl fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{} ({})", self.base, instance),
            None => write!(f, "{}", self.base),
        }
    }
}

/// Maps route targets to concrete upstream base URIs.
pub struct TargetResolver {
    registry: Option<Arc<dyn DiscoveryRegistry>>,
    strategy: Box<dyn SelectionStrategy>,
    query_timeout: Duration,
}

impl TargetResolver {
    pub fn new(
        registry: Option<Arc<dyn DiscoveryRegistry>>,
        strategy: Box<dyn SelectionStrategy>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            strategy,
            query_timeout,
        }
    }

    /// Resolver for deployments without a discovery registry.
    pub fn static_only() -> Self {
        Self::new(
            None,
            Box::new(crate::core::load_balancer::FirstStrategy),
            Duration::from_secs(1),
        )
    }

    pub fn registry(&self) -> Option<&Arc<dyn DiscoveryRegistry>> {
        self.registry.as_ref()
    }

    pub async fn resolve(&self, target: &TargetSpec) -> Result<ResolvedTarget, ResolveError> {
        match target {
            TargetSpec::Static(uri) => Ok(ResolvedTarget {
                base: uri.clone(),
                instance: None,
            }),
            TargetSpec::Discovered(service) => self.resolve_service(service).await,
        }
    }

    async fn resolve_service(&self, service: &str) -> Result<ResolvedTarget, ResolveError> {
        let registry = self.registry.as_ref().ok_or_else(|| ResolveError::NoRegistry {
            service: service.to_string(),
        })?;

        let instances = tokio::time::timeout(self.query_timeout, registry.get_instances(service))
            .await
            .map_err(|_| ResolveError::Timeout {
                service: service.to_string(),
                timeout: self.query_timeout,
            })?
            .map_err(|source| ResolveError::Discovery {
                service: service.to_string(),
                source,
            })?;

        tracing::debug!(
            service = %service,
            instances = instances.len(),
            "Discovery lookup completed"
        );

        let instance = self
            .strategy
            .select(service, &instances)
            .await
            .ok_or_else(|| ResolveError::NoInstanceAvailable {
                service: service.to_string(),
            })?
            .clone();

        let base = Uri::from_str(&instance.base_uri()).map_err(|e| ResolveError::InvalidInstance {
            instance: instance.to_string(),
            reason: e.to_string(),
        })?;

        Ok(ResolvedTarget {
            base,
            instance: Some(instance),
        })
    }
}
