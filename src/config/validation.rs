//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check route identity (unique ids, parseable methods, absolute paths)
//! - Validate value ranges (thresholds > 0, timeouts > 0, addresses parse)
//! - Report overlapping routes (first match wins, so this only warns)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{GatewayConfig, RegistryConfig};
use crate::routing::router::parse_method;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("route #{index} has an empty id")]
    EmptyRouteId { index: usize },

    #[error("duplicate route id '{0}'")]
    DuplicateRouteId(String),

    #[error("route '{id}' has invalid method '{method}'")]
    InvalidMethod { id: String, method: String },

    #[error("route '{id}' path '{path}' must start with '/'")]
    RelativePath { id: String, path: String },

    #[error("route '{id}' path '{path}' is under the reserved /fallback/ prefix")]
    ReservedPath { id: String, path: String },

    #[error("route '{0}' has no target service")]
    MissingService(String),

    #[error("failure threshold for {0} must be at least 1")]
    ZeroFailureThreshold(String),

    #[error("listener max_connections must be at least 1")]
    ZeroMaxConnections,

    #[error("proxy timeout must be greater than zero")]
    ZeroProxyTimeout,

    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("service '{service}' has invalid instance address '{address}'")]
    InvalidInstanceAddress { service: String, address: String },

    #[error("invalid registry url '{0}'")]
    InvalidRegistryUrl(String),

    #[error("fallback alias '{0}' must be a single non-empty path segment")]
    InvalidFallbackAlias(String),

    #[error("duplicate fallback alias '{0}'")]
    DuplicateFallbackAlias(String),
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener",
            value: config.listener.bind_address.clone(),
        });
    }

    // A zero-permit limiter would park every request forever.
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    validate_routes(config, &mut errors);

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::ZeroFailureThreshold("default breaker".into()));
    }
    for (service, over) in &config.circuit_breaker.services {
        if over.failure_threshold == Some(0) {
            errors.push(ValidationError::ZeroFailureThreshold(service.clone()));
        }
    }

    if config.proxy.timeout_ms == 0 {
        errors.push(ValidationError::ZeroProxyTimeout);
    }

    match &config.registry {
        RegistryConfig::Static { services } => {
            for service in services {
                for address in &service.addresses {
                    if !is_host_port(address) {
                        errors.push(ValidationError::InvalidInstanceAddress {
                            service: service.name.clone(),
                            address: address.clone(),
                        });
                    }
                }
            }
        }
        RegistryConfig::Http { url, .. } => {
            let ok = url::Url::parse(url)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !ok {
                errors.push(ValidationError::InvalidRegistryUrl(url.clone()));
            }
        }
    }

    let mut aliases = HashSet::new();
    for fallback in &config.fallbacks {
        if fallback.alias.is_empty() || fallback.alias.contains('/') {
            errors.push(ValidationError::InvalidFallbackAlias(fallback.alias.clone()));
        } else if !aliases.insert(fallback.alias.as_str()) {
            errors.push(ValidationError::DuplicateFallbackAlias(fallback.alias.clone()));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "metrics",
            value: config.observability.metrics_address.clone(),
        });
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin",
            value: config.admin.bind_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Served by the gateway itself; a rule here would never be reached.
const RESERVED_PREFIX: &str = "/fallback/";

fn validate_routes(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let mut ids = HashSet::new();
    let mut pairs = HashSet::new();

    for (index, route) in config.routes.iter().enumerate() {
        if route.id.is_empty() {
            errors.push(ValidationError::EmptyRouteId { index });
        } else if !ids.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRouteId(route.id.clone()));
        }

        let method = parse_method(&route.method);
        if method.is_none() {
            errors.push(ValidationError::InvalidMethod {
                id: route.id.clone(),
                method: route.method.clone(),
            });
        }

        if !route.path.starts_with('/') {
            errors.push(ValidationError::RelativePath {
                id: route.id.clone(),
                path: route.path.clone(),
            });
        } else if route.path.starts_with(RESERVED_PREFIX) {
            errors.push(ValidationError::ReservedPath {
                id: route.id.clone(),
                path: route.path.clone(),
            });
        }

        if route.service.trim().is_empty() {
            errors.push(ValidationError::MissingService(route.id.clone()));
        }

        if let Some(method) = method {
            if !pairs.insert((method, route.path.as_str())) {
                tracing::warn!(
                    route = %route.id,
                    path = %route.path,
                    "Route overlaps an earlier rule and will never match"
                );
            }
        }
    }
}

fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
