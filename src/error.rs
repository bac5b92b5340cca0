//! Dispatch error taxonomy.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

use crate::discovery::RegistryError;

/// Why a request did not produce a backend response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("registry lookup for {service} failed: {source}")]
    RegistryUnavailable {
        service: String,
        #[source]
        source: RegistryError,
    },

    #[error("no live instances for {0}")]
    EmptyPool(String),

    #[error("upstream {address} timed out after {timeout:?}")]
    UpstreamTimeout { address: String, timeout: Duration },

    #[error("upstream {address} failed: {reason}")]
    UpstreamConnection { address: String, reason: String },

    #[error("client disconnected before the request was forwarded")]
    ClientDisconnected,

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl DispatchError {
    /// Whether the error is the backend's fault and must feed the breaker.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            DispatchError::RegistryUnavailable { .. }
                | DispatchError::EmptyPool(_)
                | DispatchError::UpstreamTimeout { .. }
                | DispatchError::UpstreamConnection { .. }
        )
    }

    /// Whether the caller should receive the service's fallback reply.
    pub fn wants_fallback(&self) -> bool {
        self.is_backend_failure() || matches!(self, DispatchError::CircuitOpen(_))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::RouteNotFound { .. } => "route_not_found",
            DispatchError::CircuitOpen(_) => "circuit_open",
            DispatchError::RegistryUnavailable { .. } => "registry_unavailable",
            DispatchError::EmptyPool(_) => "empty_pool",
            DispatchError::UpstreamTimeout { .. } => "upstream_timeout",
            DispatchError::UpstreamConnection { .. } => "upstream_connection",
            DispatchError::ClientDisconnected => "client_disconnected",
            DispatchError::PayloadTooLarge { .. } => "payload_too_large",
        }
    }

    /// Status for errors that are answered without a fallback.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DispatchError::ClientDisconnected => StatusCode::BAD_REQUEST,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}
