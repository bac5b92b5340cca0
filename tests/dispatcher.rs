//! Dispatch pipeline scenarios against registry and upstream doubles.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use hyper::body::Frame;
use tokio::sync::Notify;

use edge_gateway::config::GatewayConfig;
use edge_gateway::fallback::FallbackBody;
use edge_gateway::resilience::CircuitStatus;
use edge_gateway::Dispatcher;

mod common;
use common::{post, test_config, CountingRegistry, Reply, ScriptedUpstream};

const ORDERS: &str = "/api/orders/bulk";
const INVENTORY: &str = "/api/inventory/check-bulk";

fn gateway(
    config: &GatewayConfig,
    registry: CountingRegistry,
    upstream: ScriptedUpstream,
) -> (Arc<Dispatcher>, Arc<CountingRegistry>, Arc<ScriptedUpstream>) {
    let registry = Arc::new(registry);
    let upstream = Arc::new(upstream);
    let dispatcher = Dispatcher::new(config, registry.clone(), upstream.clone()).unwrap();
    (Arc::new(dispatcher), registry, upstream)
}

async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

async fn fallback_body(response: Response) -> FallbackBody {
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Drive a service's breaker to Open with `threshold` transport failures.
async fn trip(dispatcher: &Dispatcher, path: &str, threshold: u32) {
    for _ in 0..threshold {
        let response = dispatcher.dispatch(post(path)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

/// Request body that fails on first read, as when the client hangs up mid-upload.
struct BrokenBody;

impl hyper::body::Body for BrokenBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(Some(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "client went away",
        ))))
    }
}

fn broken_post(path: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .body(Body::new(BrokenBody))
        .unwrap()
}

#[tokio::test]
async fn unmatched_request_is_404_and_touches_no_breaker() {
    let (dispatcher, registry, upstream) = gateway(
        &test_config(),
        CountingRegistry::with_pool(&["10.0.0.1:8080"]),
        ScriptedUpstream::new(Reply::Status(200)),
    );

    let unknown = Request::builder()
        .method("GET")
        .uri("/api/unknown")
        .body(Body::empty())
        .unwrap();
    let response = dispatcher.dispatch(unknown).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["message"], "No matching route found");
    assert_eq!(body["status"], 404);

    // Right path, wrong method.
    let wrong_method = Request::builder()
        .method("GET")
        .uri(ORDERS)
        .body(Body::empty())
        .unwrap();
    let response = dispatcher.dispatch(wrong_method).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(dispatcher.breakers().is_empty());
    assert_eq!(registry.calls(), 0);
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn empty_pool_serves_order_fallback_and_counts_one_failure() {
    let (dispatcher, registry, upstream) = gateway(
        &test_config(),
        CountingRegistry::empty(),
        ScriptedUpstream::new(Reply::Status(200)),
    );

    let body = fallback_body(dispatcher.dispatch(post(ORDERS)).await).await;
    assert_eq!(body.message, "Order service is currently unavailable");
    assert_eq!(body.status, 503);
    assert!(chrono::DateTime::parse_from_rfc3339(&body.timestamp).is_ok());

    let breaker = dispatcher.breakers().get("order-service").unwrap();
    assert_eq!(breaker.state().consecutive_failures, 1);
    assert_eq!(breaker.state().status, CircuitStatus::Closed);
    assert_eq!(registry.calls(), 1);
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn fifth_failure_opens_and_sixth_request_skips_registry() {
    let (dispatcher, registry, _upstream) = gateway(
        &test_config(),
        CountingRegistry::failing(),
        ScriptedUpstream::new(Reply::Status(200)),
    );

    for _ in 0..5 {
        let body = fallback_body(dispatcher.dispatch(post(INVENTORY)).await).await;
        assert_eq!(body.message, "Inventory service is currently unavailable");
    }
    assert_eq!(registry.calls(), 5);

    let breaker = dispatcher.breakers().get("inventory-service").unwrap();
    assert_eq!(breaker.state().status, CircuitStatus::Open);

    let body = fallback_body(dispatcher.dispatch(post(INVENTORY)).await).await;
    assert_eq!(body.message, "Inventory service is currently unavailable");
    assert_eq!(registry.calls(), 5);

    // Other services are unaffected.
    let orders = dispatcher.breakers().get("order-service");
    assert!(orders.is_none());
}

#[tokio::test]
async fn round_robin_cycles_registry_order() {
    let (dispatcher, _registry, upstream) = gateway(
        &test_config(),
        CountingRegistry::with_pool(&["10.0.0.1:8080", "10.0.0.2:8080", "10.0.0.3:8080"]),
        ScriptedUpstream::new(Reply::Status(200)),
    );

    for _ in 0..6 {
        let response = dispatcher.dispatch(post(ORDERS)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(
        upstream.seen(),
        vec![
            "10.0.0.1:8080",
            "10.0.0.2:8080",
            "10.0.0.3:8080",
            "10.0.0.1:8080",
            "10.0.0.2:8080",
            "10.0.0.3:8080",
        ]
    );
}

#[tokio::test]
async fn backend_error_status_is_returned_verbatim_and_resets_failures() {
    let (dispatcher, _registry, upstream) = gateway(
        &test_config(),
        CountingRegistry::with_pool(&["10.0.0.1:8080"]),
        ScriptedUpstream::new(Reply::Status(200)),
    );
    upstream.push(Reply::Refuse);
    upstream.push(Reply::Refuse);
    upstream.push(Reply::Status(500));

    dispatcher.dispatch(post(ORDERS)).await;
    dispatcher.dispatch(post(ORDERS)).await;
    let breaker = dispatcher.breakers().get("order-service").unwrap();
    assert_eq!(breaker.state().consecutive_failures, 2);

    let response = dispatcher.dispatch(post(ORDERS)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(&body_bytes(response).await[..], b"10.0.0.1:8080");
    assert_eq!(breaker.state().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn upstream_timeout_counts_as_failure() {
    let (dispatcher, _registry, _upstream) = gateway(
        &test_config(),
        CountingRegistry::with_pool(&["10.0.0.1:8080"]),
        ScriptedUpstream::new(Reply::Hang),
    );

    let body = fallback_body(dispatcher.dispatch(post(ORDERS)).await).await;
    assert_eq!(body.message, "Order service is currently unavailable");
    let breaker = dispatcher.breakers().get("order-service").unwrap();
    assert_eq!(breaker.state().consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn open_circuit_admits_single_probe_after_cool_down() {
    let (dispatcher, registry, upstream) = gateway(
        &test_config(),
        CountingRegistry::with_pool(&["10.0.0.1:8080"]),
        ScriptedUpstream::new(Reply::Refuse),
    );
    trip(&dispatcher, INVENTORY, 5).await;
    let breaker = dispatcher.breakers().get("inventory-service").unwrap();
    assert_eq!(breaker.state().status, CircuitStatus::Open);

    // Still inside the cool-down.
    tokio::time::advance(Duration::from_millis(29_000)).await;
    fallback_body(dispatcher.dispatch(post(INVENTORY)).await).await;
    assert_eq!(registry.calls(), 5);

    tokio::time::advance(Duration::from_millis(1_000)).await;
    let gate = Arc::new(Notify::new());
    upstream.push(Reply::AfterGate(gate.clone(), 200));

    let probe = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(post(INVENTORY)).await })
    };
    while upstream.calls() < 6 {
        tokio::task::yield_now().await;
    }
    assert_eq!(breaker.state().status, CircuitStatus::HalfOpen);
    assert!(breaker.state().half_open_probe_in_flight);

    // Concurrent requests while the probe is out are short-circuited.
    for _ in 0..3 {
        fallback_body(dispatcher.dispatch(post(INVENTORY)).await).await;
    }
    assert_eq!(registry.calls(), 6);
    assert_eq!(upstream.calls(), 6);

    gate.notify_one();
    let response = probe.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let state = breaker.state();
    assert_eq!(state.status, CircuitStatus::Closed);
    assert_eq!(state.consecutive_failures, 0);
    assert!(!state.half_open_probe_in_flight);
}

#[tokio::test(start_paused = true)]
async fn failed_probe_reopens_and_restarts_cool_down() {
    let (dispatcher, registry, _upstream) = gateway(
        &test_config(),
        CountingRegistry::with_pool(&["10.0.0.1:8080"]),
        ScriptedUpstream::new(Reply::Refuse),
    );
    trip(&dispatcher, ORDERS, 5).await;

    tokio::time::advance(Duration::from_millis(30_000)).await;
    fallback_body(dispatcher.dispatch(post(ORDERS)).await).await;
    assert_eq!(registry.calls(), 6);

    let breaker = dispatcher.breakers().get("order-service").unwrap();
    let state = breaker.state();
    assert_eq!(state.status, CircuitStatus::Open);
    assert!(!state.half_open_probe_in_flight);

    // opened_at was refreshed, so the next request is short-circuited again.
    tokio::time::advance(Duration::from_millis(10_000)).await;
    fallback_body(dispatcher.dispatch(post(ORDERS)).await).await;
    assert_eq!(registry.calls(), 6);
}

#[tokio::test]
async fn client_body_errors_are_not_recorded() {
    let (dispatcher, registry, upstream) = gateway(
        &test_config(),
        CountingRegistry::with_pool(&["10.0.0.1:8080"]),
        ScriptedUpstream::new(Reply::Status(200)),
    );

    let response = dispatcher.dispatch(broken_post(ORDERS)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let oversize = Request::builder()
        .method("POST")
        .uri(ORDERS)
        .header(header::CONTENT_LENGTH, (64 * 1024 * 1024).to_string())
        .body(Body::from("{}"))
        .unwrap();
    let response = dispatcher.dispatch(oversize).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let breaker = dispatcher.breakers().get("order-service").unwrap();
    assert_eq!(breaker.state().consecutive_failures, 0);
    assert_eq!(registry.calls(), 0);
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn streamed_oversize_body_is_413_and_not_recorded() {
    let mut config = test_config();
    config.proxy.max_body_size = 16;
    let (dispatcher, registry, upstream) = gateway(
        &config,
        CountingRegistry::with_pool(&["10.0.0.1:8080"]),
        ScriptedUpstream::new(Reply::Status(200)),
    );

    // No Content-Length, so the limit trips while buffering.
    let request = Request::builder()
        .method("POST")
        .uri(ORDERS)
        .body(Body::from(vec![b'x'; 64]))
        .unwrap();
    assert!(request.headers().get(header::CONTENT_LENGTH).is_none());

    let response = dispatcher.dispatch(request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["message"], "Request body too large");

    let breaker = dispatcher.breakers().get("order-service").unwrap();
    assert_eq!(breaker.state().consecutive_failures, 0);
    assert_eq!(registry.calls(), 0);
    assert_eq!(upstream.calls(), 0);

    // A body at the limit goes through.
    let request = Request::builder()
        .method("POST")
        .uri(ORDERS)
        .body(Body::from(vec![b'x'; 16]))
        .unwrap();
    assert_eq!(dispatcher.dispatch(request).await.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn abandoned_probe_frees_the_slot() {
    let (dispatcher, _registry, upstream) = gateway(
        &test_config(),
        CountingRegistry::with_pool(&["10.0.0.1:8080"]),
        ScriptedUpstream::new(Reply::Refuse),
    );
    trip(&dispatcher, ORDERS, 5).await;
    tokio::time::advance(Duration::from_millis(30_000)).await;

    // A probe whose client hangs up before sending its body.
    let response = dispatcher.dispatch(broken_post(ORDERS)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let breaker = dispatcher.breakers().get("order-service").unwrap();
    assert_eq!(breaker.state().status, CircuitStatus::HalfOpen);
    assert!(!breaker.state().half_open_probe_in_flight);

    // A probe whose caller is dropped mid-flight.
    upstream.push(Reply::Hang);
    let probe = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(post(ORDERS)).await })
    };
    while upstream.calls() < 6 {
        tokio::task::yield_now().await;
    }
    assert!(breaker.state().half_open_probe_in_flight);
    probe.abort();
    assert!(probe.await.unwrap_err().is_cancelled());
    assert!(!breaker.state().half_open_probe_in_flight);
    assert_eq!(breaker.state().consecutive_failures, 5);

    // The next caller becomes the probe and closes the circuit.
    upstream.push(Reply::Status(200));
    let response = dispatcher.dispatch(post(ORDERS)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(breaker.state().status, CircuitStatus::Closed);
}

#[tokio::test]
async fn route_reload_keeps_breaker_state() {
    let (dispatcher, _registry, _upstream) = gateway(
        &test_config(),
        CountingRegistry::with_pool(&["10.0.0.1:8080"]),
        ScriptedUpstream::new(Reply::Refuse),
    );
    trip(&dispatcher, ORDERS, 2).await;

    let mut next = test_config();
    next.routes.push(common::route(
        "orders-v2",
        "POST",
        "/api/v2/orders/bulk",
        "order-service",
    ));
    dispatcher.reload_routes(&next).unwrap();
    assert_eq!(dispatcher.routes().len(), 4);

    dispatcher.dispatch(post("/api/v2/orders/bulk")).await;
    let breaker = dispatcher.breakers().get("order-service").unwrap();
    assert_eq!(breaker.state().consecutive_failures, 3);

    let mut broken = test_config();
    broken.routes.push(common::route("bad", "NOT A METHOD", "/x", "svc"));
    assert!(dispatcher.reload_routes(&broken).is_err());
    assert_eq!(dispatcher.routes().len(), 4);
}
