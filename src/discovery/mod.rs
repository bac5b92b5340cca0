//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → target service identified
//!     → ServiceRegistry::resolve(service)
//!         - static_registry.rs (instances from config, mutable at runtime)
//!         - http_registry.rs (external discovery registry over HTTP)
//!     → Vec<ServiceInstance> (possibly empty)
//! ```
//!
//! # Design Decisions
//! - Instances are looked up per dispatch and never cached by the gateway
//! - Empty pool and registry failure are both "no instance available"
//! - The registry is a trait so the dispatcher can be tested with doubles

pub mod http_registry;
pub mod registry;
pub mod static_registry;

use std::sync::Arc;

use crate::config::RegistryConfig;

pub use http_registry::HttpRegistry;
pub use registry::{RegistryError, ServiceInstance, ServiceRegistry};
pub use static_registry::StaticRegistry;

/// Build the registry client described by the config.
pub fn from_config(config: &RegistryConfig) -> Result<Arc<dyn ServiceRegistry>, RegistryError> {
    match config {
        RegistryConfig::Static { services } => Ok(Arc::new(StaticRegistry::from_config(services))),
        RegistryConfig::Http { url, timeout_ms } => Ok(Arc::new(HttpRegistry::new(
            url,
            std::time::Duration::from_millis(*timeout_ms),
        )?)),
    }
}
