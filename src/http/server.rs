//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the dispatch and fallback handlers
//! - Wire up middleware (request ID, tracing, concurrency limit)
//! - Bind server to listener, serve until shutdown
//! - Apply route table reloads as they arrive
//! - Start the admin listener when enabled

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::config::GatewayConfig;
use crate::dispatch::{BuildError, Dispatcher};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response::status_reply;
use crate::lifecycle::shutdown::signalled;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a server with the registry and upstream client named in `config`.
    pub fn new(config: GatewayConfig) -> Result<Self, BuildError> {
        let dispatcher = Arc::new(Dispatcher::from_config(&config)?);
        Ok(Self::with_dispatcher(config, dispatcher))
    }

    /// Create a server around an already-built dispatcher.
    pub fn with_dispatcher(config: GatewayConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let state = AppState { dispatcher };
        let router = build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.state.dispatcher.routes().len(),
            "HTTP server starting"
        );

        let dispatcher = Arc::clone(&self.state.dispatcher);
        let reload_task = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if let Err(e) = dispatcher.reload_routes(&config) {
                    tracing::error!(error = %e, "Rejected route table reload");
                }
            }
        });

        let admin_task = if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(self.config.admin.bind_address.as_str()).await?;
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
            let app = admin::setup_admin_router(self.state.clone());
            let admin_shutdown = signalled(shutdown.resubscribe());
            Some(tokio::spawn(async move {
                axum::serve(admin_listener, app)
                    .with_graceful_shutdown(admin_shutdown)
                    .await
            }))
        } else {
            None
        };

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signalled(shutdown))
            .await?;

        reload_task.abort();
        if let Some(task) = admin_task {
            if let Ok(Err(e)) = task.await {
                tracing::warn!(error = %e, "Admin API stopped with error");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(config: &GatewayConfig, state: AppState) -> Router {
    Router::new()
        .route(
            "/fallback/{alias}",
            get(fallback_endpoint)
                .post(fallback_endpoint)
                .fallback(dispatch_handler),
        )
        .fallback(dispatch_handler)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(propagate_request_id_layer())
                .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections)),
        )
}

/// Every request that is not a fallback endpoint goes through the dispatcher.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.dispatcher.dispatch(request).await
}

/// `/fallback/{alias}`: the degraded reply on demand, regardless of breaker state.
async fn fallback_endpoint(State(state): State<AppState>, Path(alias): Path<String>) -> Response {
    let fallback = state.dispatcher.fallback();
    match fallback.respond_for_alias(&alias) {
        Some(reply) => {
            if let Some(service) = fallback.service_for_alias(&alias) {
                metrics::record_fallback(service, "endpoint");
            }
            reply.into_response()
        }
        None => status_reply(StatusCode::NOT_FOUND, "No fallback registered"),
    }
}
