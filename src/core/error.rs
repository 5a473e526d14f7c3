//! Error taxonomy for route compilation and per-request forwarding.
//!
//! [`RouteConfigError`] is raised while the route table is compiled at startup
//! and is always fatal. [`ForwardError`] is scoped to a single request: every
//! variant maps to a distinct HTTP status and never affects other requests.
use std::{fmt, time::Duration};

use axum::{
    Json,
    body::Body,
    response::{IntoResponse, Response},
};
use hyper::{Method, StatusCode};
use thiserror::Error;

use crate::core::{resolver::ResolveError, rewrite::RewriteError};

/// Problems found while compiling route definitions.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RouteConfigError {
    #[error("invalid path pattern '{pattern}': {reason}")]
    InvalidPathPattern { pattern: String, reason: String },

    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("malformed rewrite template '{template}': {reason}")]
    MalformedTemplate { template: String, reason: String },

    #[error("rewrite template '{template}' references group '{group}' not defined by '{pattern}'")]
    UnknownGroup {
        template: String,
        group: String,
        pattern: String,
    },

    #[error("invalid HTTP method '{method}'")]
    InvalidMethod { method: String },

    #[error("invalid header name '{name}'")]
    InvalidHeaderName { name: String },

    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("duplicate route id '{id}'")]
    DuplicateRouteId { id: String },

    #[error("route id must not be empty")]
    EmptyRouteId,

    #[error("route '{id}': {source}")]
    InRoute {
        id: String,
        #[source]
        source: Box<RouteConfigError>,
    },
}

impl RouteConfigError {
    pub(crate) fn in_route(id: &str, source: RouteConfigError) -> Self {
        RouteConfigError::InRoute {
            id: id.to_string(),
            source: Box::new(source),
        }
    }
}

/// Lifecycle of a single forwarded request.
///
/// `Received -> Matched -> Rewritten -> Resolved -> Forwarded -> Completed`,
/// with `Failed` reachable from every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardStage {
    Received,
    Matched,
    Rewritten,
    Resolved,
    Forwarded,
    Completed,
    Failed,
}

impl ForwardStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardStage::Received => "received",
            ForwardStage::Matched => "matched",
            ForwardStage::Rewritten => "rewritten",
            ForwardStage::Resolved => "resolved",
            ForwardStage::Forwarded => "forwarded",
            ForwardStage::Completed => "completed",
            ForwardStage::Failed => "failed",
        }
    }
}

impl fmt::Display for ForwardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-scoped forwarding failures.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ForwardError {
    #[error("no route matched {method} {path}")]
    NoRouteMatched { method: Method, path: String },

    #[error("route '{route_id}' could not rewrite the request path: {source}")]
    Rewrite {
        route_id: String,
        #[source]
        source: RewriteError,
    },

    #[error("route '{route_id}': {source}")]
    NoInstanceAvailable {
        route_id: String,
        #[source]
        source: ResolveError,
    },

    #[error("route '{route_id}': upstream {target} did not respond within {timeout:?}")]
    DownstreamTimeout {
        route_id: String,
        target: String,
        timeout: Duration,
    },

    #[error("route '{route_id}': upstream {target} request failed: {message}")]
    DownstreamConnection {
        route_id: String,
        target: String,
        message: String,
    },
}

impl ForwardError {
    /// HTTP status relayed to the caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ForwardError::NoRouteMatched { .. } => StatusCode::NOT_FOUND,
            ForwardError::Rewrite { .. } => StatusCode::BAD_REQUEST,
            ForwardError::NoInstanceAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ForwardError::DownstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::DownstreamConnection { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable identifier used in error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::NoRouteMatched { .. } => "no_route_matched",
            ForwardError::Rewrite { .. } => "rewrite_error",
            ForwardError::NoInstanceAvailable { .. } => "no_instance_available",
            ForwardError::DownstreamTimeout { .. } => "downstream_timeout",
            ForwardError::DownstreamConnection { .. } => "downstream_connection_error",
        }
    }

    /// Id of the matched route, if matching succeeded.
    pub fn route_id(&self) -> Option<&str> {
        match self {
            ForwardError::NoRouteMatched { .. } => None,
            ForwardError::Rewrite { route_id, .. }
            | ForwardError::NoInstanceAvailable { route_id, .. }
            | ForwardError::DownstreamTimeout { route_id, .. }
            | ForwardError::DownstreamConnection { route_id, .. } => Some(route_id),
        }
    }

    /// The stage that was being entered when the request failed.
    pub fn stage(&self) -> ForwardStage {
        match self {
            ForwardError::NoRouteMatched { .. } => ForwardStage::Matched,
            ForwardError::Rewrite { .. } => ForwardStage::Rewritten,
            ForwardError::NoInstanceAvailable { .. } => ForwardStage::Resolved,
            ForwardError::DownstreamTimeout { .. } | ForwardError::DownstreamConnection { .. } => {
                ForwardStage::Forwarded
            }
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response<Body> {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
