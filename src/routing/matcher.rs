//! Route matching logic.
//!
//! # Responsibilities
//! - Match HTTP method (exact)
//! - Match request path (literal, case-sensitive)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Path matching is case-sensitive and ignores the query string
//! - No wildcards or regex; patterns are literal paths
//! - Matchers are pure and never look at headers or body

use axum::http::Method;

/// Trait for matching a request line against a condition.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, method: &Method, path: &str) -> bool;
}

/// Matches the request method exactly.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    method: Method,
}

impl MethodMatcher {
    pub fn new(method: Method) -> Self {
        Self { method }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, method: &Method, _path: &str) -> bool {
        *method == self.method
    }
}

/// Matches the request path by literal equality.
#[derive(Debug, Clone)]
pub struct ExactPathMatcher {
    path: String,
}

impl ExactPathMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Matcher for ExactPathMatcher {
    fn matches(&self, _method: &Method, path: &str) -> bool {
        path == self.path
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.matchers.iter().all(|m| m.matches(method, path))
    }
}
