//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to a service:
//!     → circuit_breaker.rs (admit, short-circuit, or admit as half-open probe)
//!     → timeouts.rs (enforce upstream deadline)
//!     → outcome recorded back into the breaker
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - Circuit breaker prevents cascading failures
//! - Client cancellation is never counted as a backend failure

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerRegistry, CircuitOpen, CircuitSnapshot, CircuitState,
    CircuitStatus,
};
