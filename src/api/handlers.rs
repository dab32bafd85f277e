//! HTTP handlers for the relay API.

use super::types::*;
use super::AppState;
use crate::catalog::build_catalog;
use crate::error::RelayError;
use crate::proxy::{bearer_token, resolve_api_key, sse_frames, ChunkStream, UpstreamTarget};
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;

// ============================================================================
// Health and catalog handlers
// ============================================================================

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: "prompt-relay",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<CatalogResponse> {
    Json(build_catalog(&state.config.catalog))
}

// ============================================================================
// Chat completions handlers
// ============================================================================

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let result = match body {
        Ok(body) => relay_completion(&state, &headers, &body).await,
        Err(rejection) => Err(RelayError::Proxy(format!(
            "Invalid request body: {}",
            rejection.body_text()
        ))),
    };
    match result {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("[LLM Proxy] Error: {}", e);
            e.into_response()
        }
    }
}

async fn relay_completion(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, RelayError> {
    let base_url = state
        .config
        .upstream
        .backend_url()
        .ok_or_else(RelayError::backend_not_configured)?;

    let mut request: Value = serde_json::from_slice(body)
        .map_err(|e| RelayError::Proxy(format!("Invalid request body: {}", e)))?;
    let fields = request
        .as_object_mut()
        .ok_or_else(|| RelayError::Proxy("Request body must be a JSON object".to_string()))?;

    let streaming = fields.get("stream").and_then(Value::as_bool) == Some(true);
    fields.insert("stream".to_string(), Value::Bool(streaming));

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let api_key = resolve_api_key(bearer_token(authorization), state.config.upstream.api_key());
    let target = UpstreamTarget::new(base_url, api_key);

    let model = fields.get("model").and_then(Value::as_str).unwrap_or("unknown");
    tracing::info!(model, stream = streaming, "Relaying chat completion");

    if streaming {
        let chunks = state.upstream.complete_stream(&target, &request).await?;
        Ok(event_stream_response(chunks))
    } else {
        let completion = state.upstream.complete(&target, &request).await?;
        Ok(([(header::CONTENT_TYPE, "application/json")], completion).into_response())
    }
}

fn event_stream_response(chunks: ChunkStream) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(sse_frames(chunks)),
    )
        .into_response()
}

/// CORS preflight. Unlisted origins get an empty allow-origin header.
pub async fn completions_preflight(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let allow_origin = if state.config.cors.is_allowed(origin) {
        origin.to_string()
    } else {
        String::new()
    };

    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS".to_string()),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization".to_string()),
        ],
    )
}
