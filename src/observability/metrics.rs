//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): latency by service
//! - `gateway_fallbacks_total` (counter): fallback replies by service and reason
//! - `gateway_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op, so tests need no setup
//! - Labels for service, method, status code

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitStatus;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "service" => service.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_fallback(service: &str, reason: &'static str) {
    metrics::counter!(
        "gateway_fallbacks_total",
        "service" => service.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_circuit_state(service: &str, status: CircuitStatus) {
    metrics::gauge!("gateway_circuit_state", "service" => service.to_string()).set(status.as_gauge());
}
