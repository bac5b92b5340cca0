//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, fallback endpoints)
//!     → request.rs (request ID)
//!     → dispatch (route → breaker → registry → balancer → upstream)
//!     → response.rs (hop-by-hop stripping, JSON errors)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
