//! Re-framing upstream chunks as server-sent events.

use axum::body::Bytes;
use futures::{stream, Stream, StreamExt};

use crate::error::RelayError;

/// Terminal frame sent after the last upstream chunk.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Wrap one upstream chunk, verbatim, in an SSE data frame.
pub fn data_frame(chunk: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", chunk))
}

enum RelayState<S> {
    Streaming(S),
    /// `[DONE]` has been emitted.
    Finished,
    /// The upstream failed mid-stream; the outgoing body is aborted.
    Failed,
}

/// Turn upstream chunks into SSE frames.
///
/// Frames follow upstream order one-to-one and end with [`DONE_FRAME`]. An
/// upstream error yields a single `Err`, which aborts the response body;
/// nothing follows it, including `[DONE]`.
pub fn sse_frames<S>(chunks: S) -> impl Stream<Item = Result<Bytes, std::io::Error>>
where
    S: Stream<Item = Result<String, RelayError>> + Unpin,
{
    stream::unfold(RelayState::Streaming(chunks), |state| async move {
        match state {
            RelayState::Streaming(mut chunks) => match chunks.next().await {
                Some(Ok(chunk)) => Some((Ok(data_frame(&chunk)), RelayState::Streaming(chunks))),
                Some(Err(e)) => {
                    tracing::error!("[LLM Proxy] Stream error: {}", e);
                    Some((Err(std::io::Error::other(e)), RelayState::Failed))
                }
                None => Some((Ok(Bytes::from_static(DONE_FRAME.as_bytes())), RelayState::Finished)),
            },
            RelayState::Finished | RelayState::Failed => None,
        }
    })
}
