//! Admin API: read-only views of routes and breaker state.
//!
//! Served on its own listener (`admin.bind_address`, loopback by default).

pub mod handlers;

use axum::{routing::get, Router};

use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/circuits", get(get_circuits))
        .with_state(state)
}
