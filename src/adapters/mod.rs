pub mod config_providers;
pub mod discovery;
pub mod http_client;
pub mod http_handler;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use config_providers::{FileConfigProvider, HttpConfigProvider};
pub use discovery::{HttpRegistry, StaticRegistry};
pub use http_client::HttpClientAdapter;
pub use http_handler::{HttpHandler, router};
pub use middleware::request_id_middleware;
