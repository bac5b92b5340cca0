//! Registry client contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One live instance of a logical service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// "host:port".
    pub address: String,
    pub service_name: String,
}

impl ServiceInstance {
    pub fn new(service_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            service_name: service_name.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("invalid registry url '{0}'")]
    InvalidUrl(String),
}

/// Source of live instance addresses for a logical service name.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Current instances in registry order. An unknown service is an empty pool.
    async fn resolve(&self, service: &str) -> Result<Vec<ServiceInstance>, RegistryError>;
}
