//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, concurrency cap).
    pub listener: ListenerConfig,

    /// Ordered route rules. First match wins.
    pub routes: Vec<RouteConfig>,

    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Upstream proxy settings.
    pub proxy: ProxySettings,

    /// Where live instances are discovered.
    pub registry: RegistryConfig,

    /// Degraded responses, addressable as `/fallback/{alias}`.
    pub fallbacks: Vec<FallbackConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            routes: Vec::new(),
            circuit_breaker: CircuitBreakerConfig::default(),
            proxy: ProxySettings::default(),
            registry: RegistryConfig::default(),
            fallbacks: default_fallbacks(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrently served requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// A single route rule as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Unique route identifier for logging/metrics.
    pub id: String,

    /// Literal request path to match (case-sensitive).
    pub path: String,

    /// HTTP method to match (e.g., "POST").
    pub method: String,

    /// Logical name of the backend service.
    pub service: String,
}

/// Circuit breaker defaults plus per-service overrides.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// How long an open circuit short-circuits before admitting a probe.
    pub cool_down_ms: u64,

    /// Overrides keyed by service name.
    pub services: HashMap<String, BreakerOverride>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down_ms: 30_000,
            services: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BreakerOverride {
    pub failure_threshold: Option<u32>,
    pub cool_down_ms: Option<u64>,
}

/// Effective thresholds for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cool_down: Duration,
}

impl CircuitBreakerConfig {
    /// Resolve the thresholds that apply to `service`.
    pub fn settings_for(&self, service: &str) -> BreakerSettings {
        let over = self.services.get(service);
        BreakerSettings {
            failure_threshold: over
                .and_then(|o| o.failure_threshold)
                .unwrap_or(self.failure_threshold),
            cool_down: Duration::from_millis(
                over.and_then(|o| o.cool_down_ms).unwrap_or(self.cool_down_ms),
            ),
        }
    }
}

/// Upstream proxy settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Deadline for a single upstream exchange in milliseconds.
    pub timeout_ms: u64,

    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl ProxySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Service discovery source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RegistryConfig {
    /// Fixed instance lists from this file.
    Static {
        #[serde(default)]
        services: Vec<StaticServiceConfig>,
    },
    /// External discovery registry queried over HTTP.
    Http {
        url: String,
        #[serde(default = "default_registry_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig::Static {
            services: Vec::new(),
        }
    }
}

fn default_registry_timeout_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticServiceConfig {
    pub name: String,
    /// Instance addresses as "host:port".
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// A degraded response for one service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackConfig {
    /// Path segment under `/fallback/`.
    pub alias: String,

    /// Service this fallback speaks for.
    pub service: String,

    pub message: String,
}

fn default_fallbacks() -> Vec<FallbackConfig> {
    [
        ("orders", "order-service", "Order service is currently unavailable"),
        ("inventory", "inventory-service", "Inventory service is currently unavailable"),
        ("payments", "payment-service", "Payment service is currently unavailable"),
    ]
    .into_iter()
    .map(|(alias, service, message)| FallbackConfig {
        alias: alias.to_string(),
        service: service.to_string(),
        message: message.to_string(),
    })
    .collect()
}

/// Log output encoding.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
