//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Service resolved → Vec<ServiceInstance> from the registry
//!     → round_robin.rs (rotate through the pool, index kept per service)
//!     → Return one instance or None for an empty pool
//! ```
//!
//! # Design Decisions
//! - The pool is passed in per call; the balancer only owns the rotation index
//! - Index wraps modulo the current pool size, so membership may change freely
//! - Round-robin is the only policy

pub mod round_robin;

use crate::discovery::ServiceInstance;

pub use round_robin::RoundRobin;

/// Trait for load balancing algorithms.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Select the next instance for `service` from its current pool.
    fn select(&self, service: &str, instances: &[ServiceInstance]) -> Option<ServiceInstance>;
}
