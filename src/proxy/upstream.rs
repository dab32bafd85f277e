//! HTTP client for the upstream chat-completion service.

use axum::body::Bytes;
use backoff::ExponentialBackoff;
use eventsource_stream::Eventsource;
use futures::{future, Stream, StreamExt};
use reqwest::{Client, Response};
use serde::de::IgnoredAny;
use serde_json::Value;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::normalize_base_url;
use crate::error::RelayError;
use crate::http::{create_upstream_client, MAX_RETRIES, UPSTREAM_TIMEOUT};

/// Data payloads of a streamed completion, in arrival order and byte for
/// byte as the upstream sent them.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// Where a single completion request goes.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamTarget {
    pub base_url: String,
    pub api_key: String,
}

impl UpstreamTarget {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url).to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Upstream client with a fixed timeout and retry budget.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamClient {
    const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
    const MAX_BACKOFF: Duration = Duration::from_secs(8);

    pub fn new() -> Self {
        Self {
            client: create_upstream_client(),
            timeout: UPSTREAM_TIMEOUT,
            max_retries: MAX_RETRIES,
            initial_backoff: Self::INITIAL_BACKOFF,
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Non-streaming completion: the upstream JSON body, unchanged.
    ///
    /// The body is checked to be JSON but never re-encoded.
    pub async fn complete(&self, target: &UpstreamTarget, body: &Value) -> Result<Bytes, RelayError> {
        let response = self.send(target, body).await?;
        let bytes = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| self.timeout_error())??;

        if let Err(e) = serde_json::from_slice::<IgnoredAny>(&bytes) {
            let preview: String = String::from_utf8_lossy(&bytes).chars().take(500).collect();
            return Err(RelayError::Proxy(format!(
                "Invalid upstream response: {} | Response: {}",
                e, preview
            )));
        }
        Ok(bytes)
    }

    /// Streaming completion: decoded chunks until the upstream `[DONE]`.
    pub async fn complete_stream(
        &self,
        target: &UpstreamTarget,
        body: &Value,
    ) -> Result<ChunkStream, RelayError> {
        let response = self.send(target, body).await?;
        Ok(decode_chunks(response.bytes_stream()))
    }

    /// Send the request, retrying transient failures.
    ///
    /// Only successful responses are returned; anything else becomes an error.
    async fn send(&self, target: &UpstreamTarget, body: &Value) -> Result<Response, RelayError> {
        let attempts = AtomicU32::new(0);
        let policy = ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            max_interval: Self::MAX_BACKOFF,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                let (error, transient) = match self.send_once(target, body).await {
                    Ok(response) => return Ok(response),
                    Err(failure) => failure,
                };

                if transient && attempt < self.max_retries {
                    tracing::warn!(attempt = attempt + 1, "Retrying upstream request: {}", error);
                    Err(backoff::Error::transient(error))
                } else {
                    Err(backoff::Error::permanent(error))
                }
            }
        })
        .await
    }

    /// One upstream attempt. Errors carry whether a retry may help.
    async fn send_once(
        &self,
        target: &UpstreamTarget,
        body: &Value,
    ) -> Result<Response, (RelayError, bool)> {
        let request = self
            .client
            .post(target.completions_url())
            .bearer_auth(&target.api_key)
            .json(body)
            .send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Err(_) => return Err((self.timeout_error(), true)),
            Ok(Err(e)) => {
                let transient = e.is_connect() || e.is_timeout();
                return Err((e.into(), transient));
            }
            Ok(Ok(response)) => response,
        };

        if response.status().is_success() {
            return Ok(response);
        }

        let error = api_error(response).await;
        let transient = error.is_transient();
        Err((error, transient))
    }

    fn timeout_error(&self) -> RelayError {
        RelayError::Proxy(format!(
            "Upstream request timed out after {}s",
            self.timeout.as_secs()
        ))
    }
}

/// Build an `Api` error from a non-success upstream response.
async fn api_error(response: Response) -> RelayError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let parsed: Option<Value> = serde_json::from_str(&text).ok();
    let detail = parsed.as_ref().map(|v| v.get("error").unwrap_or(v));

    let message = detail
        .and_then(|d| d.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| detail.and_then(Value::as_str).map(str::to_string))
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Upstream request failed")
                .to_string()
        });
    let code = detail.and_then(|d| d.get("code")).cloned();

    RelayError::Api {
        status: Some(status.as_u16()),
        message,
        code,
    }
}

/// Decode an upstream SSE byte stream into completion chunks.
///
/// Stops at `[DONE]`. Undecodable data and in-band `error` objects surface as
/// errors so the relay can abort.
pub(crate) fn decode_chunks<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let chunks = bytes
        .eventsource()
        .take_while(|event| {
            let done = matches!(event, Ok(event) if event.data.trim() == "[DONE]");
            future::ready(!done)
        })
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) if event.data.trim().is_empty() => None,
                Ok(event) => Some(check_chunk(event.data)),
                Err(e) => Some(Err(RelayError::Proxy(format!("Upstream stream failed: {}", e)))),
            })
        });

    Box::pin(chunks)
}

/// Pass a chunk through untouched once it is known to be JSON without an
/// in-band `error` object.
fn check_chunk(data: String) -> Result<String, RelayError> {
    let chunk: Value = serde_json::from_str(&data)
        .map_err(|e| RelayError::Proxy(format!("Invalid upstream chunk: {}", e)))?;

    if let Some(error) = chunk.get("error").filter(|e| e.is_object()) {
        return Err(RelayError::Api {
            status: None,
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Upstream stream error")
                .to_string(),
            code: error.get("code").cloned(),
        });
    }

    Ok(data)
}
