//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (route lookup in table order)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched RouteRule or no match (404)
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → Parse methods, compile matchers
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at load, immutable at runtime
//! - A reload replaces the whole table; rules are never patched in place
//! - Deterministic: same input always matches same route
//! - First match wins (ordered as configured)

pub mod matcher;
pub mod router;

pub use router::{RouteError, RouteRule, RouteSummary, RouteTable};
