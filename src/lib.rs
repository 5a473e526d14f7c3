//! Switchyard - a service-routing reverse proxy.
//!
//! Switchyard sits between callers and a set of backend services. Each inbound
//! request is matched against an ordered list of route rules (first match
//! wins), its path is optionally rewritten with regex capture groups, the
//! route's target is resolved (a static URI, or a service name looked up in a
//! discovery registry on every request), and the request is forwarded once,
//! with a bounded timeout, to the selected upstream. The upstream response is
//! relayed back with hop-by-hop headers removed.
//!
//! # Quick Example
//! ```no_run
//! use switchyard::{HttpHandler, config::ServerConfig, router};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg: ServerConfig = switchyard::config::loader::load_config("switchyard.yaml").await?;
//! switchyard::config::ServerConfigValidator::validate(&cfg)?;
//! let app = router(HttpHandler::from_config(&cfg)?);
//! let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
//! axum::serve(
//!     listener,
//!     app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//! )
//! .await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping routing, rewriting, resolution and the forwarding state
//! machine inside `core`.
//!
//! # Error Handling
//! Startup APIs return `eyre::Result<T>`. Request-scoped failures are
//! [`core::ForwardError`] values, each mapped to one HTTP status.
//!
//! # Concurrency & Data Structures
//! Request handling shares only immutable state plus the per-service
//! round-robin cursors, kept in an `scc::HashMap`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler, router},
    core::{ForwardError, ForwardingEngine},
    ports::{discovery::DiscoveryRegistry, http_client::UpstreamClient},
    utils::GracefulShutdown,
};
