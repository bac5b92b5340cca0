//! Fallback responder.
//!
//! Produces the degraded 503 reply used whenever a known service cannot be
//! reached: circuit open, empty pool, registry down, upstream error or timeout.
//! The same reply is exposed at `/fallback/{alias}` for manual checks.

pub mod responder;

pub use responder::{FallbackBody, FallbackResponder, FallbackResponse};
