//! Unified error handling for the relay.
//!
//! Every failure on the request path ends up as a `RelayError`, which renders
//! as the `{error: {message, type, code?}}` envelope callers expect.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

pub const BACKEND_NOT_CONFIGURED: &str =
    "LLM backend not configured. Set LLM_BACKEND_URL environment variable.";

/// Error type for completion proxy operations.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayError {
    /// No upstream base URL is configured.
    Config(String),
    /// The upstream service rejected the request.
    Api {
        status: Option<u16>,
        message: String,
        code: Option<serde_json::Value>,
    },
    /// Anything else: malformed input, network faults, undecodable responses.
    Proxy(String),
}

impl RelayError {
    pub fn backend_not_configured() -> Self {
        Self::Config(BACKEND_NOT_CONFIGURED.to_string())
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(_) | Self::Proxy(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Api { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Get the error type string.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Api { .. } => "api_error",
            Self::Proxy(_) => "proxy_error",
        }
    }

    /// Whether a fresh attempt at the same upstream call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api {
                status: Some(status),
                ..
            } => matches!(status, 408 | 409 | 429) || *status >= 500,
            _ => false,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Config(msg) | Self::Proxy(msg) => msg,
            Self::Api { message, .. } => message,
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "{}", msg),
            Self::Api {
                status: Some(status),
                message,
                ..
            } => write!(f, "Upstream returned {}: {}", status, message),
            Self::Api { message, .. } => write!(f, "Upstream error: {}", message),
            Self::Proxy(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        Self::Proxy(format!("Upstream request failed: {}", e))
    }
}

/// Error response structure for JSON serialization.
#[derive(Serialize)]
struct ErrorResponseBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    message: &'a str,
    r#type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a serde_json::Value>,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let code = match &self {
            Self::Api { code, .. } => code.as_ref().filter(|c| !c.is_null()),
            _ => None,
        };
        let body = ErrorResponseBody {
            error: ErrorDetail {
                message: self.message(),
                r#type: self.error_type(),
                code,
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}
