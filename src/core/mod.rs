pub mod error;
pub mod forwarder;
pub mod instance;
pub mod load_balancer;
pub mod resolver;
pub mod rewrite;
pub mod route;

pub use error::{ForwardError, ForwardStage, RouteConfigError};
pub use forwarder::{ForwardSettings, ForwardingEngine};
pub use instance::ServiceInstance;
pub use load_balancer::LoadBalancerFactory;
pub use resolver::{ResolveError, ResolvedTarget, TargetResolver, TargetSpec};
pub use rewrite::{PathRewrite, RewriteError};
pub use route::{RouteRule, RouteTable};
