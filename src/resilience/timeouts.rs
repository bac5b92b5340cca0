//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap upstream calls with a deadline
//! - Keep timeout errors distinct from the call's own errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry
//! - A timeout is a backend failure for breaker accounting

use std::future::Future;
use std::time::Duration;

/// Failure of a deadline-bounded call.
#[derive(Debug, PartialEq, Eq)]
pub enum Deadline<E> {
    /// The call did not finish within the limit.
    Elapsed(Duration),
    /// The call finished with its own error.
    Failed(E),
}

/// Run `call` with an upper bound on its duration.
pub async fn with_deadline<F, T, E>(limit: Duration, call: F) -> Result<T, Deadline<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Deadline::Failed(e)),
        Err(_) => Err(Deadline::Elapsed(limit)),
    }
}
