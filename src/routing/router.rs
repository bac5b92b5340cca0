//! Route table and lookup.
//!
//! # Responsibilities
//! - Compile route configs into an ordered table
//! - Look up the matching rule for a (method, path) pair
//! - Return matched rule or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in table order (acceptable for typical route counts)
//! - Explicit no-match rather than silent default

use std::sync::Arc;

use axum::http::Method;
use serde::Serialize;
use thiserror::Error;

use crate::config::RouteConfig;
use crate::routing::matcher::{AndMatcher, ExactPathMatcher, Matcher, MethodMatcher};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route '{id}' has invalid method '{method}'")]
    InvalidMethod { id: String, method: String },
}

/// Parse a configured method name, accepting any letter case.
pub fn parse_method(raw: &str) -> Option<Method> {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes()).ok()
}

/// A compiled route rule.
#[derive(Debug)]
pub struct RouteRule {
    pub id: String,
    pub method: Method,
    pub path_pattern: String,
    pub target_service: String,
    matcher: AndMatcher,
}

impl RouteRule {
    pub fn new(
        id: impl Into<String>,
        method: Method,
        path_pattern: impl Into<String>,
        target_service: impl Into<String>,
    ) -> Self {
        let path_pattern = path_pattern.into();
        let matcher = AndMatcher::new(vec![
            Box::new(MethodMatcher::new(method.clone())),
            Box::new(ExactPathMatcher::new(path_pattern.clone())),
        ]);
        Self {
            id: id.into(),
            method,
            path_pattern,
            target_service: target_service.into(),
            matcher,
        }
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.matcher.matches(method, path)
    }

    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            id: self.id.clone(),
            method: self.method.to_string(),
            path: self.path_pattern.clone(),
            service: self.target_service.clone(),
        }
    }
}

/// Serializable view of a rule for the admin API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RouteSummary {
    pub id: String,
    pub method: String,
    pub path: String,
    pub service: String,
}

/// Ordered, immutable set of route rules. First match wins.
#[derive(Debug, Default)]
pub struct RouteTable {
    rules: Vec<Arc<RouteRule>>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self {
            rules: rules.into_iter().map(Arc::new).collect(),
        }
    }

    /// Compile route configs, preserving their order.
    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, RouteError> {
        let rules = routes
            .iter()
            .map(|route| {
                let method = parse_method(&route.method).ok_or_else(|| RouteError::InvalidMethod {
                    id: route.id.clone(),
                    method: route.method.clone(),
                })?;
                Ok(RouteRule::new(
                    route.id.clone(),
                    method,
                    route.path.clone(),
                    route.service.clone(),
                ))
            })
            .collect::<Result<Vec<_>, RouteError>>()?;

        Ok(Self::new(rules))
    }

    /// Find the first rule whose method and path both match.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<Arc<RouteRule>> {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn summaries(&self) -> Vec<RouteSummary> {
        self.rules.iter().map(|r| r.summary()).collect()
    }
}
