//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers between client and backend
//! - Render gateway-generated errors as JSON
//!
//! # Design Decisions
//! - Backend responses stream through; only connection-level headers change
//! - Gateway error bodies share the `{message, status, timestamp}` shape of
//!   fallback replies and never expose internal error kinds

use axum::{
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    message: &'a str,
    status: u16,
    timestamp: String,
}

/// JSON reply for errors the gateway answers itself.
pub fn status_reply(status: StatusCode, message: &str) -> Response {
    let body = StatusBody {
        message,
        status: status.as_u16(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    (status, Json(body)).into_response()
}
