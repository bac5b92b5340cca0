//! Edge gateway library: route matching, service discovery, round-robin
//! balancing and per-service circuit breaking with fallback replies.

pub mod admin;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod fallback;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use dispatch::Dispatcher;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
