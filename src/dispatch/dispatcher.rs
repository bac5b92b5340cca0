//! Per-request orchestration.
//!
//! ```text
//! match route ──none──▶ 404
//!     │
//! breaker admit ──open──────────────────────────────┐
//!     │                                             │
//! buffer body ──too large──▶ 413 (unrecorded)       │
//!     │  └──read error──▶ (client gone, unrecorded) │
//! registry resolve ──err/empty──▶ record failure ───┤
//!     │                                             │
//! balancer select ──none──▶ record failure ─────────┤
//!     │                                             │
//! upstream (deadline) ──err/timeout──▶ failure ─────┤
//!     │                                             ▼
//! record success ──▶ backend response       fallback 503
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::body::{Body, Bytes};
use axum::http::{header, Request};
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::config::{GatewayConfig, ProxySettings};
use crate::discovery::{self, RegistryError, ServiceRegistry};
use crate::error::DispatchError;
use crate::fallback::FallbackResponder;
use crate::http::request::request_id;
use crate::http::response::status_reply;
use crate::load_balancer::{LoadBalancer, RoundRobin};
use crate::observability::metrics;
use crate::resilience::timeouts::{with_deadline, Deadline};
use crate::resilience::CircuitBreakerRegistry;
use crate::routing::{RouteError, RouteRule, RouteTable};

use super::upstream::{build_request, HyperUpstream, Upstream, UpstreamError};

/// The routing-and-resilience pipeline.
pub struct Dispatcher {
    routes: ArcSwap<RouteTable>,
    breakers: CircuitBreakerRegistry,
    registry: Arc<dyn ServiceRegistry>,
    balancer: Box<dyn LoadBalancer>,
    upstream: Arc<dyn Upstream>,
    fallback: FallbackResponder,
    timeout: Duration,
    max_body_size: usize,
}

/// Startup failure while assembling the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Routes(#[from] RouteError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl Dispatcher {
    pub fn new(
        config: &GatewayConfig,
        registry: Arc<dyn ServiceRegistry>,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, RouteError> {
        let routes = RouteTable::from_config(&config.routes)?;
        Ok(Self {
            routes: ArcSwap::from_pointee(routes),
            breakers: CircuitBreakerRegistry::new(config.circuit_breaker.clone()),
            registry,
            balancer: Box::new(RoundRobin::new()),
            upstream,
            fallback: FallbackResponder::new(&config.fallbacks),
            timeout: config.proxy.timeout(),
            max_body_size: config.proxy.max_body_size,
        })
    }

    /// Dispatcher with the configured registry and a hyper upstream client.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, BuildError> {
        let registry = discovery::from_config(&config.registry)?;
        Ok(Self::new(config, registry, Arc::new(HyperUpstream::new()))?)
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn fallback(&self) -> &FallbackResponder {
        &self.fallback
    }

    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }

    /// Swap in a freshly compiled route table. The old one stays intact on error.
    pub fn reload_routes(&self, config: &GatewayConfig) -> Result<(), RouteError> {
        let table = RouteTable::from_config(&config.routes)?;
        tracing::info!(routes = table.len(), "Route table reloaded");
        self.routes.store(Arc::new(table));
        Ok(())
    }

    pub fn proxy_settings(&self) -> ProxySettings {
        ProxySettings {
            timeout_ms: self.timeout.as_millis() as u64,
            max_body_size: self.max_body_size,
        }
    }

    /// Handle one inbound request end to end. Never fails.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let request_id = request_id(&request);
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let Some(rule) = self.routes.load().match_route(&method, &path) else {
            tracing::debug!(request_id = %request_id, method = %method, path = %path, "No route matched");
            metrics::record_request(method.as_str(), 404, "none", start);
            return status_reply(
                DispatchError::RouteNotFound {
                    method: method.to_string(),
                    path,
                }
                .status_code(),
                "No matching route found",
            );
        };

        let service = rule.target_service.as_str();
        tracing::debug!(
            request_id = %request_id,
            route = %rule.id,
            service = %service,
            "Dispatching request"
        );

        let response = match self.forward(&rule, request).await {
            Ok(response) => response,
            Err(err) if err.wants_fallback() => {
                tracing::warn!(
                    request_id = %request_id,
                    service = %service,
                    error = %err,
                    "Serving fallback"
                );
                metrics::record_fallback(service, err.kind());
                self.fallback.respond(service).into_response()
            }
            Err(err) => {
                tracing::info!(request_id = %request_id, service = %service, error = %err, "Request rejected");
                let message = match err {
                    DispatchError::PayloadTooLarge { .. } => "Request body too large",
                    _ => "Request body could not be read",
                };
                status_reply(err.status_code(), message)
            }
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), service, start);
        response
    }

    /// Breaker-guarded attempt. Outcomes are settled here and only here.
    async fn forward(&self, rule: &RouteRule, request: Request<Body>) -> Result<Response, DispatchError> {
        let service = &rule.target_service;
        let breaker = self.breakers.get_or_create(service);
        let permit = breaker
            .try_acquire()
            .map_err(|_| DispatchError::CircuitOpen(service.clone()))?;

        match self.attempt(service, request).await {
            Ok(response) => {
                permit.success();
                Ok(response)
            }
            Err(err) if err.is_backend_failure() => {
                permit.failure();
                Err(err)
            }
            // Client-side problems leave the breaker untouched.
            Err(err) => Err(err),
        }
    }

    async fn attempt(&self, service: &str, request: Request<Body>) -> Result<Response, DispatchError> {
        let (parts, body) = request.into_parts();
        let body = self.read_body(&parts.headers, body).await?;

        let instances = self
            .registry
            .resolve(service)
            .await
            .map_err(|source| DispatchError::RegistryUnavailable {
                service: service.to_string(),
                source,
            })?;

        let instance = self
            .balancer
            .select(service, &instances)
            .ok_or_else(|| DispatchError::EmptyPool(service.to_string()))?;

        let outbound = build_request(&parts, body, &instance).map_err(|e| {
            DispatchError::UpstreamConnection {
                address: instance.address.clone(),
                reason: e.to_string(),
            }
        })?;

        match with_deadline(self.timeout, self.upstream.send(outbound)).await {
            Ok(response) => Ok(response.into_response()),
            Err(Deadline::Elapsed(timeout)) => Err(DispatchError::UpstreamTimeout {
                address: instance.address,
                timeout,
            }),
            Err(Deadline::Failed(UpstreamError::InvalidAddress(address))) => {
                Err(DispatchError::UpstreamConnection {
                    reason: format!("invalid address '{}'", address),
                    address,
                })
            }
            Err(Deadline::Failed(UpstreamError::Transport(reason))) => {
                Err(DispatchError::UpstreamConnection {
                    address: instance.address,
                    reason,
                })
            }
        }
    }

    async fn read_body(&self, headers: &header::HeaderMap, body: Body) -> Result<Bytes, DispatchError> {
        let limit = self.max_body_size;
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(DispatchError::PayloadTooLarge { limit });
        }

        match Limited::new(body, limit).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(DispatchError::PayloadTooLarge { limit })
            }
            Err(_) => Err(DispatchError::ClientDisconnected),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.load().len())
            .field("breakers", &self.breakers.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
