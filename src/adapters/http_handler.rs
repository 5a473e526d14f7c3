use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request},
    http::{Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
};
use eyre::{Result, WrapErr};
use tower_http::trace::TraceLayer;

use crate::{
    adapters::{
        HttpClientAdapter, discovery::registry_from_config, middleware::request_id_middleware,
    },
    config::models::{AdminConfig, ServerConfig},
    core::{
        ForwardSettings, ForwardingEngine, LoadBalancerFactory, RouteTable, TargetResolver,
    },
    ports::http_client::UpstreamClient,
};

/// HTTP handler for the Switchyard gateway.
///
/// Admin requests are answered locally; everything else goes through the
/// forwarding engine.
#[derive(Clone)]
pub struct HttpHandler {
    engine: Arc<ForwardingEngine>,
    admin: AdminConfig,
}

impl HttpHandler {
    pub fn new(engine: Arc<ForwardingEngine>, admin: AdminConfig) -> Self {
        Self { engine, admin }
    }

    /// Wire the engine from a validated configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let connect_timeout = config
            .forward
            .connect_timeout()
            .wrap_err("Invalid forward.connect_timeout")?;
        let client = Arc::new(HttpClientAdapter::with_connect_timeout(connect_timeout)?)
            as Arc<dyn UpstreamClient>;
        Self::from_config_with_client(config, client)
    }

    /// Same as [`HttpHandler::from_config`] with a caller supplied upstream client.
    pub fn from_config_with_client(
        config: &ServerConfig,
        client: Arc<dyn UpstreamClient>,
    ) -> Result<Self> {
        let routes =
            RouteTable::from_config(&config.routes).wrap_err("Failed to compile route table")?;

        let discovery_timeout = config
            .discovery
            .timeout()
            .wrap_err("Invalid discovery.timeout")?;
        let registry = config
            .discovery
            .registry
            .as_ref()
            .map(|registry| registry_from_config(registry, discovery_timeout))
            .transpose()?;
        let resolver = TargetResolver::new(
            registry,
            LoadBalancerFactory::create_strategy(&config.discovery.selection),
            discovery_timeout,
        );

        let settings = ForwardSettings {
            timeout: config.forward.timeout().wrap_err("Invalid forward.timeout")?,
            forwarded_headers: config.forward.forwarded_headers,
        };

        let engine = ForwardingEngine::new(routes, resolver, client, settings);
        Ok(Self::new(Arc::new(engine), config.admin.clone()))
    }

    pub fn engine(&self) -> &ForwardingEngine {
        &self.engine
    }

    /// Main request handler; never fails, errors become JSON responses
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        if let Some(admin_path) = self.admin_path(req.uri().path()) {
            let admin_path = admin_path.to_string();
            return self.handle_admin(req.method(), &admin_path).await;
        }

        match self.engine.forward(req, client_addr).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }

    /// Remainder of `path` when it targets the admin surface.
    fn admin_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        if !self.admin.enabled {
            return None;
        }
        let rest = path.strip_prefix(self.admin.path_prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }

    async fn handle_admin(&self, method: &Method, path: &str) -> Response<AxumBody> {
        if method != Method::GET {
            return admin_error(StatusCode::METHOD_NOT_ALLOWED, "only GET is supported");
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["routes"] => self.handle_routes(),
            ["services"] => self.handle_services().await,
            ["instances", service] => self.handle_instances(service).await,
            _ => admin_error(StatusCode::NOT_FOUND, "unknown admin endpoint"),
        }
    }

    fn handle_routes(&self) -> Response<AxumBody> {
        let routes: Vec<serde_json::Value> = self
            .engine
            .routes()
            .iter()
            .map(|rule| {
                serde_json::json!({
                    "id": rule.id(),
                    "path": rule.path_pattern(),
                    "method": rule.method().map(|m| m.as_str()),
                    "target": rule.target().to_string(),
                    "rewrites": rule.rewrites().len(),
                })
            })
            .collect();
        Json(routes).into_response()
    }

    async fn handle_services(&self) -> Response<AxumBody> {
        let Some(registry) = self.engine.resolver().registry() else {
            return admin_error(StatusCode::NOT_FOUND, "no discovery registry configured");
        };
        match registry.list_services().await {
            Ok(services) => Json(services).into_response(),
            Err(e) => {
                tracing::warn!(error = %e, "Registry listing failed");
                admin_error(StatusCode::BAD_GATEWAY, &e.to_string())
            }
        }
    }

    async fn handle_instances(&self, service: &str) -> Response<AxumBody> {
        let Some(registry) = self.engine.resolver().registry() else {
            return admin_error(StatusCode::NOT_FOUND, "no discovery registry configured");
        };
        match registry.get_instances(service).await {
            Ok(instances) => Json(instances).into_response(),
            Err(e) => {
                tracing::warn!(service = %service, error = %e, "Registry lookup failed");
                admin_error(StatusCode::BAD_GATEWAY, &e.to_string())
            }
        }
    }
}

fn admin_error(status: StatusCode, message: &str) -> Response<AxumBody> {
    let body = serde_json::json!({
        "error": "admin",
        "message": message,
        "status": status.as_u16(),
    });
    (status, Json(body)).into_response()
}

/// Build the axum application: every path is handled by `handler`.
pub fn router(handler: HttpHandler) -> Router {
    let handler = Arc::new(handler);
    Router::new()
        .fallback(move |req: Request| {
            let handler = handler.clone();
            async move {
                let client_addr = req
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| *addr);
                handler.handle_request(req, client_addr).await
            }
        })
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
}
