//! Chat-completion forwarding to an OpenAI-compatible upstream.
//!
//! The proxy is stateless: each request resolves its upstream target, makes
//! one upstream call (with bounded retries), and relays the result either as
//! a JSON document or as a re-framed server-sent event stream.

mod relay;
mod upstream;

pub use relay::{data_frame, sse_frames, DONE_FRAME};
pub use upstream::{ChunkStream, UpstreamClient, UpstreamTarget};

/// Caller keys with these prefixes stand in for "no key".
pub const PLACEHOLDER_PREFIXES: &[&str] = &["dummy", "sk-placeholder"];

/// Key sent upstream when neither the caller nor the server supplies one.
pub const FALLBACK_API_KEY: &str = "dummy";

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ")
}

pub fn is_placeholder_key(key: &str) -> bool {
    PLACEHOLDER_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

/// Pick the upstream key: a real caller key, else the server key, else
/// [`FALLBACK_API_KEY`].
pub fn resolve_api_key<'a>(caller_key: Option<&'a str>, server_key: Option<&'a str>) -> &'a str {
    caller_key
        .filter(|key| !key.is_empty() && !is_placeholder_key(key))
        .or(server_key.filter(|key| !key.is_empty()))
        .unwrap_or(FALLBACK_API_KEY)
}

/// Strip a trailing `/chat/completions` (and slashes) from a configured URL.
pub fn normalize_base_url(url: &str) -> &str {
    let url = url.trim_end_matches('/');
    url.strip_suffix("/chat/completions")
        .unwrap_or(url)
        .trim_end_matches('/')
}
