//! Per-request orchestration: match, rewrite, resolve, forward, relay.
//!
//! The engine owns only read-only state (the route table, the resolver and the
//! outbound client handle), so any number of requests can be driven through
//! it concurrently. Each call moves through the [`ForwardStage`]s in order and
//! stops at the first failure; nothing is retried.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::body::Body as AxumBody;
use hyper::{
    HeaderMap, Request, Response, Uri,
    header::{self, HeaderName, HeaderValue},
};
use tracing::Instrument;

use crate::{
    core::{
        error::{ForwardError, ForwardStage},
        resolver::TargetResolver,
        rewrite::RewriteError,
        route::RouteTable,
    },
    metrics,
    ports::http_client::{HttpClientError, UpstreamClient},
    tracing_setup,
};

/// Headers that only apply to a single transport hop.
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub const X_REQUEST_ID: &str = "x-request-id";
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_PREFIX: &str = "x-forwarded-prefix";

/// Tunables for the outbound leg.
#[derive(Debug, Clone)]
pub struct ForwardSettings {
    /// Bound on waiting for the upstream response head
    pub timeout: Duration,
    /// Add `X-Forwarded-*` headers to upstream requests
    pub forwarded_headers: bool,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            forwarded_headers: true,
        }
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// The forwarding engine.
pub struct ForwardingEngine {
    routes: Arc<RouteTable>,
    resolver: TargetResolver,
    client: Arc<dyn UpstreamClient>,
    settings: ForwardSettings,
}

impl ForwardingEngine {
    pub fn new(
        routes: RouteTable,
        resolver: TargetResolver,
        client: Arc<dyn UpstreamClient>,
        settings: ForwardSettings,
    ) -> Self {
        Self {
            routes: Arc::new(routes),
            resolver,
            client,
            settings,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn resolver(&self) -> &TargetResolver {
        &self.resolver
    }

    pub fn settings(&self) -> &ForwardSettings {
        &self.settings
    }

    /// Forward one inbound request and return the upstream response unmodified
    /// apart from hop-by-hop headers.
    pub async fn forward(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>, ForwardError> {
        let method = req.method().clone();
        let request_id = req
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let span = tracing_setup::create_request_span(method.as_str(), req.uri().path(), &request_id);
        let _timer = metrics::RequestTimer::new(method.as_str());

        let result = self
            .run(req, client_addr)
            .instrument(span.clone())
            .await;

        match result {
            Ok((route_id, response)) => {
                let status = response.status().as_u16();
                span.record("stage", ForwardStage::Completed.as_str());
                span.record("http.status_code", status);
                metrics::increment_request_total(&route_id, method.as_str(), status);
                tracing::info!(parent: &span, route = %route_id, status, "Request forwarded");
                Ok(response)
            }
            Err(err) => {
                let status = err.status_code().as_u16();
                span.record("stage", ForwardStage::Failed.as_str());
                span.record("http.status_code", status);
                metrics::increment_request_total(
                    err.route_id().unwrap_or(metrics::UNMATCHED_ROUTE),
                    method.as_str(),
                    status,
                );
                metrics::increment_forward_failure(err.kind());
                match &err {
                    ForwardError::NoRouteMatched { .. } => {
                        tracing::info!(parent: &span, error = %err, "No route matched")
                    }
                    ForwardError::DownstreamConnection { .. } => {
                        tracing::error!(parent: &span, failed_at = %err.stage(), error = %err, "Upstream request failed")
                    }
                    _ => {
                        tracing::warn!(parent: &span, failed_at = %err.stage(), error = %err, "Forwarding failed")
                    }
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<(String, Response<AxumBody>), ForwardError> {
        let span = tracing::Span::current();
        span.record("stage", ForwardStage::Received.as_str());
        let (mut parts, body) = req.into_parts();

        // RECEIVED -> MATCHED
        let rule = self
            .routes
            .find(&parts.method, parts.uri.path(), &parts.headers)
            .ok_or_else(|| ForwardError::NoRouteMatched {
                method: parts.method.clone(),
                path: parts.uri.path().to_string(),
            })?;
        let route_id = rule.id().to_string();
        span.record("route", route_id.as_str());
        span.record("stage", ForwardStage::Matched.as_str());

        // MATCHED -> REWRITTEN
        let original_path = parts.uri.path().to_string();
        let path = rule
            .rewrite_path(&original_path)
            .map_err(|source| ForwardError::Rewrite {
                route_id: route_id.clone(),
                source,
            })?;
        span.record("stage", ForwardStage::Rewritten.as_str());
        tracing::debug!(from = %original_path, to = %path, "Path rewritten");

        // REWRITTEN -> RESOLVED
        let target = self.resolver.resolve(rule.target()).await.map_err(|source| {
            ForwardError::NoInstanceAvailable {
                route_id: route_id.clone(),
                source,
            }
        })?;
        span.record("stage", ForwardStage::Resolved.as_str());
        tracing::debug!(target = %target, "Target resolved");

        let upstream_uri = target
            .join(&path, parts.uri.query())
            .map_err(|e| ForwardError::Rewrite {
                route_id: route_id.clone(),
                source: RewriteError::InvalidPath {
                    path: path.clone(),
                    reason: e.to_string(),
                },
            })?;

        // RESOLVED -> FORWARDED
        // HTTP/2 callers carry the authority in the URI instead of `Host`
        let original_host = parts.headers.get(header::HOST).cloned().or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
        });
        strip_hop_by_hop_headers(&mut parts.headers);
        if self.settings.forwarded_headers {
            add_forwarded_headers(
                &mut parts.headers,
                client_addr,
                original_host,
                forwarded_prefix(&original_path, &path),
            );
        }
        set_host_header(&mut parts.headers, &upstream_uri);
        parts.uri = upstream_uri;

        let upstream = target.uri().to_string();
        let method = parts.method.clone();
        span.record("stage", ForwardStage::Forwarded.as_str());

        let upstream_span =
            tracing_setup::create_upstream_span(&upstream, method.as_str(), parts.uri.path());
        let upstream_timer = metrics::UpstreamRequestTimer::new(&upstream, method.as_str());
        let result = self
            .client
            .send_request(Request::from_parts(parts, body), self.settings.timeout)
            .instrument(upstream_span.clone())
            .await;
        drop(upstream_timer);

        let mut response = match result {
            Ok(response) => response,
            Err(HttpClientError::Timeout(timeout)) => {
                metrics::increment_upstream_request_total(&upstream, method.as_str(), 504);
                return Err(ForwardError::DownstreamTimeout {
                    route_id,
                    target: upstream,
                    timeout,
                });
            }
            Err(e) => {
                metrics::increment_upstream_request_total(&upstream, method.as_str(), 502);
                return Err(ForwardError::DownstreamConnection {
                    route_id,
                    target: upstream,
                    message: e.to_string(),
                });
            }
        };

        // FORWARDED -> COMPLETED
        let status = response.status().as_u16();
        upstream_span.record("http.status_code", status);
        metrics::increment_upstream_request_total(&upstream, method.as_str(), status);
        strip_hop_by_hop_headers(response.headers_mut());

        Ok((route_id, response))
    }
}

/// Leading part of the original path that the rewrite chain removed, if the
/// rewritten path is a strict suffix of the original.
fn forwarded_prefix(original: &str, rewritten: &str) -> Option<String> {
    if rewritten.len() >= original.len() || !original.ends_with(rewritten) {
        return None;
    }
    let prefix = original[..original.len() - rewritten.len()].trim_end_matches('/');
    (!prefix.is_empty()).then(|| prefix.to_string())
}

fn add_forwarded_headers(
    headers: &mut HeaderMap,
    client_addr: Option<SocketAddr>,
    original_host: Option<HeaderValue>,
    prefix: Option<String>,
) {
    if let Some(addr) = client_addr {
        let client_ip = addr.ip().to_string();
        let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}, {client_ip}"),
            _ => client_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !headers.contains_key(X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }

    if let Some(host) = original_host {
        headers.insert(X_FORWARDED_HOST, host);
    }

    if let Some(prefix) = prefix {
        if let Ok(value) = HeaderValue::from_str(&prefix) {
            headers.insert(X_FORWARDED_PREFIX, value);
        }
    }
}

fn set_host_header(headers: &mut HeaderMap, uri: &Uri) {
    if let Some(authority) = uri.authority() {
        if let Ok(value) = HeaderValue::from_str(authority.as_str()) {
            headers.insert(header::HOST, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use hyper::{Method, StatusCode};

    use super::*;
    use crate::{
        core::{
            instance::ServiceInstance, load_balancer::RoundRobinStrategy, route::RouteRule,
        },
        ports::{
            discovery::{DiscoveryRegistry, DiscoveryResult},
            http_client::HttpClientResult,
        },
    };

    /// Records the last request and answers with a canned outcome.
    #[derive(Default)]
    struct RecordingClient {
        seen: Mutex<Vec<(Uri, HeaderMap)>>,
        fail_with: Option<fn() -> HttpClientError>,
    }

    #[async_trait]
    impl UpstreamClient for RecordingClient {
        async fn send_request(
            &self,
            req: Request<AxumBody>,
            _timeout: Duration,
        ) -> HttpClientResult<Response<AxumBody>> {
            self.seen
                .lock()
                .unwrap()
                .push((req.uri().clone(), req.headers().clone()));
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONNECTION, "close")
                .header("x-upstream", "yes")
                .body(AxumBody::from("ok"))
                .unwrap())
        }
    }

    struct AddressRegistry;

    #[async_trait]
    impl DiscoveryRegistry for AddressRegistry {
        async fn list_services(&self) -> DiscoveryResult<Vec<String>> {
            Ok(vec!["address-service".to_string()])
        }

        async fn get_instances(&self, service: &str) -> DiscoveryResult<Vec<ServiceInstance>> {
            if service == "address-service" {
                Ok(vec![ServiceInstance::new("address-service", "10.0.0.1", 8080)])
            } else {
                Ok(vec![])
            }
        }
    }

    fn engine(client: Arc<RecordingClient>) -> ForwardingEngine {
        engine_with_settings(client, ForwardSettings::default())
    }

    fn engine_with_settings(
        client: Arc<RecordingClient>,
        settings: ForwardSettings,
    ) -> ForwardingEngine {
        let routes = RouteTable::new(vec![
            RouteRule::builder("person")
                .path("/person/**")
                .rewrite("/person/(?<segment>.*)", "/${segment}")
                .target("http://person-service:8080")
                .build()
                .unwrap(),
            RouteRule::builder("address")
                .path("/address/**")
                .rewrite("/address/(?<segment>.*)", "/${segment}")
                .target("lb://address-service")
                .build()
                .unwrap(),
            RouteRule::builder("ghost")
                .path("/ghost/**")
                .target("lb://ghost-service")
                .build()
                .unwrap(),
        ])
        .unwrap();
        let resolver = TargetResolver::new(
            Some(Arc::new(AddressRegistry)),
            Box::new(RoundRobinStrategy::new()),
            Duration::from_secs(1),
        );
        ForwardingEngine::new(routes, resolver, client, settings)
    }

    fn request(method: Method, uri: &str) -> Request<AxumBody> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "gateway.local")
            .header("keep-alive", "timeout=5")
            .body(AxumBody::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_static_route_rewrites_and_forwards() {
        let client = Arc::new(RecordingClient::default());
        let engine = engine(client.clone());

        let response = engine
            .forward(
                request(Method::GET, "/person/123?verbose=true"),
                Some("10.1.1.1:4000".parse().unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(header::CONNECTION));
        assert_eq!(response.headers()["x-upstream"], "yes");

        let seen = client.seen.lock().unwrap();
        let (uri, headers) = &seen[0];
        assert_eq!(uri.to_string(), "http://person-service:8080/123?verbose=true");
        assert_eq!(headers[header::HOST], "person-service:8080");
        assert_eq!(headers[X_FORWARDED_HOST], "gateway.local");
        assert_eq!(headers[X_FORWARDED_PREFIX], "/person");
        assert_eq!(headers[X_FORWARDED_FOR], "10.1.1.1");
        assert!(!headers.contains_key("keep-alive"));
    }

    #[tokio::test]
    async fn test_forwarded_headers_can_be_disabled() {
        let client = Arc::new(RecordingClient::default());
        let settings = ForwardSettings {
            forwarded_headers: false,
            ..Default::default()
        };
        let engine = engine_with_settings(client.clone(), settings);

        engine
            .forward(
                request(Method::GET, "/person/123"),
                Some("10.1.1.1:4000".parse().unwrap()),
            )
            .await
            .unwrap();

        let seen = client.seen.lock().unwrap();
        let headers = &seen[0].1;
        assert_eq!(headers[header::HOST], "person-service:8080");
        for name in [X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PROTO, X_FORWARDED_PREFIX] {
            assert!(!headers.contains_key(name), "{name} should not be sent");
        }
    }

    #[tokio::test]
    async fn test_forwarded_host_falls_back_to_uri_authority() {
        let client = Arc::new(RecordingClient::default());
        let engine = engine(client.clone());

        // HTTP/2 style: authority in the URI, no Host header
        let req = Request::builder()
            .method(Method::GET)
            .uri("http://gateway.local:8443/person/7")
            .body(AxumBody::empty())
            .unwrap();
        engine.forward(req, None).await.unwrap();

        let seen = client.seen.lock().unwrap();
        let (uri, headers) = &seen[0];
        assert_eq!(uri.to_string(), "http://person-service:8080/7");
        assert_eq!(headers[X_FORWARDED_HOST], "gateway.local:8443");
        assert_eq!(headers[header::HOST], "person-service:8080");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_are_independent() {
        let client = Arc::new(RecordingClient::default());
        let engine = Arc::new(engine(client.clone()));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32 {
            let engine = engine.clone();
            tasks.spawn(async move {
                let path = if i % 2 == 0 {
                    format!("/person/{i}")
                } else {
                    format!("/address/{i}")
                };
                engine.forward(request(Method::GET, &path), None).await
            });
        }
        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap().unwrap().status(), StatusCode::OK);
        }

        let mut seen: Vec<String> = client
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|(uri, _)| uri.to_string())
            .collect();
        seen.sort();
        let mut expected: Vec<String> = (0..32)
            .map(|i| {
                if i % 2 == 0 {
                    format!("http://person-service:8080/{i}")
                } else {
                    format!("http://10.0.0.1:8080/{i}")
                }
            })
            .collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_discovered_route_forwards_to_instance() {
        let client = Arc::new(RecordingClient::default());
        let engine = engine(client.clone());

        engine
            .forward(request(Method::POST, "/address/55"), None)
            .await
            .unwrap();

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].0.to_string(), "http://10.0.0.1:8080/55");
    }

    #[tokio::test]
    async fn test_unmatched_path_is_not_found() {
        let client = Arc::new(RecordingClient::default());
        let engine = engine(client.clone());

        let err = engine
            .forward(request(Method::GET, "/unmatched"), None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_failure_is_bad_request() {
        let client = Arc::new(RecordingClient::default());
        let engine = engine(client.clone());

        let err = engine
            .forward(request(Method::GET, "/person"), None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.route_id(), Some("person"));
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_instances_is_service_unavailable() {
        let client = Arc::new(RecordingClient::default());
        let engine = engine(client.clone());

        let err = engine
            .forward(request(Method::GET, "/ghost/1"), None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failures_map_to_gateway_errors() {
        let timeout_client = Arc::new(RecordingClient {
            fail_with: Some(|| HttpClientError::Timeout(Duration::from_secs(30))),
            ..Default::default()
        });
        let err = engine(timeout_client)
            .forward(request(Method::GET, "/person/1"), None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let refused_client = Arc::new(RecordingClient {
            fail_with: Some(|| HttpClientError::ConnectionError("connection refused".into())),
            ..Default::default()
        });
        let err = engine(refused_client.clone())
            .forward(request(Method::GET, "/person/1"), None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        // Exactly one attempt, no retry.
        assert_eq!(refused_client.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_strip_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace-hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-trace-hop", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("h2c"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-custom", HeaderValue::from_static("kept"));

        strip_hop_by_hop_headers(&mut headers);

        assert_eq!(headers.len(), 2);
        assert!(headers.contains_key(header::CONTENT_TYPE));
        assert!(headers.contains_key("x-custom"));
    }

    #[test]
    fn test_forwarded_prefix() {
        assert_eq!(forwarded_prefix("/person/42", "/42").as_deref(), Some("/person"));
        assert_eq!(forwarded_prefix("/person/42", "/person/42"), None);
        assert_eq!(forwarded_prefix("/a/b", "/x"), None);
    }

    #[test]
    fn test_forwarded_headers_append_client() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));

        add_forwarded_headers(
            &mut headers,
            Some("10.1.1.1:5555".parse().unwrap()),
            Some(HeaderValue::from_static("gateway.local")),
            Some("/person".to_string()),
        );

        assert_eq!(headers[X_FORWARDED_FOR], "203.0.113.9, 10.1.1.1");
        assert_eq!(headers[X_FORWARDED_HOST], "gateway.local");
        assert_eq!(headers[X_FORWARDED_PROTO], "http");
        assert_eq!(headers[X_FORWARDED_PREFIX], "/person");
    }
}
