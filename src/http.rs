//! Shared HTTP client factory.
//!
//! Provides consistent HTTP client configuration across the codebase.

use reqwest::Client;
use std::time::Duration;

/// Timeout for upstream chat-completion calls (2 minutes).
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for fetching the free model catalog (10 seconds).
pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Retries allowed for transient upstream failures.
pub const MAX_RETRIES: u32 = 2;

/// Timeout for establishing an upstream connection (10 seconds).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create an HTTP client for upstream completion calls.
///
/// Carries no overall timeout: a streamed body may legitimately outlive
/// `UPSTREAM_TIMEOUT`, so callers bound the wait for the response instead.
pub fn create_upstream_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        })
}

/// Create a new HTTP client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        })
}
