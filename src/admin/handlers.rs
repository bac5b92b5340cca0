use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::CircuitSnapshot;
use crate::routing::RouteSummary;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub routes: usize,
    pub tracked_services: usize,
    pub proxy_timeout_ms: u64,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let dispatcher = &state.dispatcher;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        routes: dispatcher.routes().len(),
        tracked_services: dispatcher.breakers().len(),
        proxy_timeout_ms: dispatcher.proxy_settings().timeout_ms,
    })
}

pub async fn get_routes(State(state): State<AppState>) -> Json<Vec<RouteSummary>> {
    Json(state.dispatcher.routes().summaries())
}

pub async fn get_circuits(State(state): State<AppState>) -> Json<Vec<CircuitSnapshot>> {
    Json(state.dispatcher.breakers().snapshots())
}
