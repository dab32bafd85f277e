//! HTTP API of the relay.
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /api/v1/models - Free model catalog
//! - POST /api/v1/chat/completions - Chat completions (JSON or SSE)
//! - OPTIONS /api/v1/chat/completions - CORS preflight

mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::proxy::UpstreamClient;

pub use types::*;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            upstream: UpstreamClient::new(),
        }
    }

    /// Replace the upstream client (retry and timeout tuning).
    pub fn with_upstream(mut self, upstream: UpstreamClient) -> Self {
        self.upstream = upstream;
        self
    }
}

/// Create the API router from configuration.
pub fn create_router(config: Config) -> Router {
    create_router_with_state(AppState::new(config))
}

/// Create the API router with custom state.
pub fn create_router_with_state(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.gateway.max_body_bytes);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/models", get(handlers::list_models))
        .route(
            "/api/v1/chat/completions",
            post(handlers::chat_completions)
                .options(handlers::completions_preflight)
                .layer(body_limit),
        )
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}
