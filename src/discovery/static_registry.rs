//! In-memory registry seeded from configuration.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::config::StaticServiceConfig;
use crate::discovery::registry::{RegistryError, ServiceInstance, ServiceRegistry};

/// [`ServiceRegistry`] backed by a `DashMap` of instance lists.
///
/// Suitable for fixed deployments and tests. Instances can be added or
/// removed at runtime; every `resolve` sees the latest list.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    services: DashMap<String, Vec<ServiceInstance>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[StaticServiceConfig]) -> Self {
        let registry = Self::new();
        for config in configs {
            for address in &config.addresses {
                registry.register(&config.name, address);
            }
        }
        registry
    }

    /// Add an instance. Registering the same address twice is a no-op.
    pub fn register(&self, service: &str, address: &str) {
        let instance = ServiceInstance::new(service, address);
        let mut pool = self.services.entry(service.to_string()).or_default();
        if !pool.contains(&instance) {
            pool.push(instance);
        }
    }

    /// Remove an instance. Returns whether it was present.
    pub fn deregister(&self, service: &str, address: &str) -> bool {
        match self.services.get_mut(service) {
            Some(mut pool) => {
                let before = pool.len();
                pool.retain(|i| i.address != address);
                before != pool.len()
            }
            None => false,
        }
    }

    /// Replace the whole pool for a service.
    pub fn set_instances(&self, service: &str, addresses: &[&str]) {
        let pool = addresses
            .iter()
            .map(|a| ServiceInstance::new(service, *a))
            .collect();
        self.services.insert(service.to_string(), pool);
    }
}

#[async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn resolve(&self, service: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        Ok(self
            .services
            .get(service)
            .map(|pool| pool.value().clone())
            .unwrap_or_default())
    }
}
