//! Gateway dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → dispatcher.rs (route, breaker, registry, balancer, outcome, fallback)
//!     → upstream.rs (URI rewrite and HTTP exchange with the instance)
//! ```
//!
//! # Design Decisions
//! - Every backend-facing failure becomes a fallback reply at this boundary
//! - An unmatched request never touches breaker state
//! - Dropping the dispatch future (client gone) abandons the upstream call
//!   and releases the breaker permit without recording an outcome

pub mod dispatcher;
pub mod upstream;

pub use dispatcher::{BuildError, Dispatcher};
pub use upstream::{HyperUpstream, Upstream, UpstreamError};
