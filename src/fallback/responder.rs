use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FallbackConfig;

/// JSON body of a degraded reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackBody {
    pub message: String,
    pub status: u16,
    /// RFC 3339 UTC, taken when the reply was built.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackResponse {
    pub status_code: StatusCode,
    pub body: FallbackBody,
}

impl IntoResponse for FallbackResponse {
    fn into_response(self) -> Response {
        (self.status_code, Json(self.body)).into_response()
    }
}

/// Builds fallback replies from the configured per-service messages.
#[derive(Debug, Clone, Default)]
pub struct FallbackResponder {
    messages: HashMap<String, String>,
    aliases: HashMap<String, String>,
}

impl FallbackResponder {
    pub fn new(configs: &[FallbackConfig]) -> Self {
        let mut responder = Self::default();
        for config in configs {
            responder
                .messages
                .insert(config.service.clone(), config.message.clone());
            responder
                .aliases
                .insert(config.alias.clone(), config.service.clone());
        }
        responder
    }

    /// Degraded reply for `service`. Never fails.
    pub fn respond(&self, service: &str) -> FallbackResponse {
        let message = self
            .messages
            .get(service)
            .cloned()
            .unwrap_or_else(|| format!("{} is currently unavailable", service));

        let status_code = StatusCode::SERVICE_UNAVAILABLE;
        FallbackResponse {
            status_code,
            body: FallbackBody {
                message,
                status: status_code.as_u16(),
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        }
    }

    /// Reply for a `/fallback/{alias}` endpoint, if the alias is known.
    pub fn respond_for_alias(&self, alias: &str) -> Option<FallbackResponse> {
        self.aliases.get(alias).map(|service| self.respond(service))
    }

    /// The service an alias speaks for.
    pub fn service_for_alias(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }
}
