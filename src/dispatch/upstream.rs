//! Upstream HTTP exchange.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the selected instance
//! - Forward method, headers and body; hand back the response as-is
//!
//! # Design Decisions
//! - `Upstream` is a trait so dispatch logic can run against doubles
//! - Hop-by-hop headers are stripped in both directions
//! - Any HTTP response is a transport success, whatever its status

use std::str::FromStr;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::discovery::ServiceInstance;
use crate::http::response::strip_hop_by_hop;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid instance address '{0}'")]
    InvalidAddress(String),

    #[error("{0}")]
    Transport(String),
}

/// One request/response exchange with a backend instance.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError>;
}

/// Build the outbound request for `instance` from the inbound parts.
pub fn build_request(
    parts: &Parts,
    body: Bytes,
    instance: &ServiceInstance,
) -> Result<Request<Body>, UpstreamError> {
    let authority = Authority::from_str(&instance.address)
        .map_err(|_| UpstreamError::InvalidAddress(instance.address.clone()))?;

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(authority);
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    let uri = Uri::from_parts(uri_parts)
        .map_err(|_| UpstreamError::InvalidAddress(instance.address.clone()))?;

    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    // Let the client derive Host from the rewritten authority.
    headers.remove(axum::http::header::HOST);

    let mut request = Request::new(Body::from(body));
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = headers;
    Ok(request)
}

/// [`Upstream`] over a pooled hyper client.
#[derive(Clone)]
pub struct HyperUpstream {
    client: Client<HttpConnector, Body>,
}

impl HyperUpstream {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HyperUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Upstream for HyperUpstream {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        let response: Response<Incoming> = self
            .client
            .request(request)
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}
