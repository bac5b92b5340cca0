//! Shared utilities for dispatcher and integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};

use edge_gateway::config::{GatewayConfig, RouteConfig};
use edge_gateway::discovery::{RegistryError, ServiceInstance, ServiceRegistry};
use edge_gateway::dispatch::{Upstream, UpstreamError};

/// The three bulk routes the gateway ships with.
pub fn bulk_routes() -> Vec<RouteConfig> {
    vec![
        route("order-service-bulk", "POST", "/api/orders/bulk", "order-service"),
        route(
            "inventory-check-bulk",
            "POST",
            "/api/inventory/check-bulk",
            "inventory-service",
        ),
        route(
            "notification-send-bulk",
            "POST",
            "/api/notifications/send-bulk",
            "notification-service",
        ),
    ]
}

pub fn route(id: &str, method: &str, path: &str, service: &str) -> RouteConfig {
    RouteConfig {
        id: id.into(),
        method: method.into(),
        path: path.into(),
        service: service.into(),
    }
}

/// Default config with the bulk routes and a short cool-down.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.routes = bulk_routes();
    config.circuit_breaker.failure_threshold = 5;
    config.circuit_breaker.cool_down_ms = 30_000;
    config.proxy.timeout_ms = 5_000;
    config.observability.metrics_enabled = false;
    config
}

pub fn post(path: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .body(Body::from("{}"))
        .unwrap()
}

/// Registry double that counts lookups.
pub struct CountingRegistry {
    calls: AtomicUsize,
    pool: Mutex<Result<Vec<String>, String>>,
}

impl CountingRegistry {
    pub fn with_pool(addresses: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            pool: Mutex::new(Ok(addresses.iter().map(|a| a.to_string()).collect())),
        }
    }

    pub fn empty() -> Self {
        Self::with_pool(&[])
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            pool: Mutex::new(Err("connection refused".into())),
        }
    }

    pub fn set_pool(&self, addresses: &[&str]) {
        *self.pool.lock() = Ok(addresses.iter().map(|a| a.to_string()).collect());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceRegistry for CountingRegistry {
    async fn resolve(&self, service: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.pool.lock() {
            Ok(addresses) => Ok(addresses
                .iter()
                .map(|a| ServiceInstance::new(service, a.as_str()))
                .collect()),
            Err(reason) => Err(RegistryError::Unavailable(reason.clone())),
        }
    }
}

/// What a [`ScriptedUpstream`] does with one request.
#[derive(Clone)]
pub enum Reply {
    /// Answer with this status; the body echoes the target authority.
    Status(u16),
    /// Fail at the transport level.
    Refuse,
    /// Never answer.
    Hang,
    /// Wait for the gate, then answer with the status.
    AfterGate(Arc<Notify>, u16),
}

/// Upstream double that replays queued replies and records target authorities.
pub struct ScriptedUpstream {
    default: Reply,
    script: Mutex<VecDeque<Reply>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedUpstream {
    pub fn new(default: Reply) -> Self {
        Self {
            default,
            script: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().push_back(reply);
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

fn echo(status: u16, authority: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(authority))
        .unwrap()
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        let authority = request
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();
        self.seen.lock().push(authority.clone());
        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        match reply {
            Reply::Status(status) => Ok(echo(status, authority)),
            Reply::Refuse => Err(UpstreamError::Transport("connection refused".into())),
            Reply::Hang => std::future::pending().await,
            Reply::AfterGate(gate, status) => {
                gate.notified().await;
                Ok(echo(status, authority))
            }
        }
    }
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = read_request_head(&mut socket).await;
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// A request as the backend received it.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    /// Header names lower-cased, in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Start a backend that records each request and answers `201 Created`.
pub async fn start_capturing_backend(
    response: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(captured) = read_request(&mut socket).await else {
                    return;
                };
                let _ = tx.send(captured);
                let response_str = format!(
                    "HTTP/1.1 201 Created\r\nContent-Type: text/plain\r\nX-Backend: capture\r\nKeep-Alive: timeout=5\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> std::io::Result<CapturedRequest> {
    use tokio::io::AsyncReadExt;

    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    let head_end = loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = raw[head_end + 4..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

/// Drain the request until the end of its headers.
async fn read_request_head(socket: &mut tokio::net::TcpStream) -> std::io::Result<()> {
    use tokio::io::AsyncReadExt;

    let mut seen = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        seen.extend_from_slice(&buf[..n]);
        if seen.windows(4).any(|w| w == b"\r\n\r\n") {
            return Ok(());
        }
    }
}
