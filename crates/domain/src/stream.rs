use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted by the LLM Streaming Driver (spec §4.4).
///
/// Events are emitted in the order the underlying model produces them;
/// `TextDelta` and `ToolCallRequest` may interleave and consumers must
/// preserve that order when flushing speech. `StreamError` is always the
/// terminal event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Incremental assistant text.
    #[serde(rename = "text_delta")]
    TextDelta { fragment: String },

    /// A complete tool call request — emitted only once its argument JSON
    /// has parsed successfully.
    #[serde(rename = "tool_call_request")]
    ToolCallRequest {
        id: String,
        name: String,
        args_json: serde_json::Value,
    },

    /// Terminal: the turn is complete.
    #[serde(rename = "turn_complete")]
    TurnComplete { finish_reason: String },

    /// Terminal: the stream ended in error.
    #[serde(rename = "stream_error")]
    StreamError { kind: StreamErrorKind, message: String },
}

/// Classifies a `StreamError` for retry/propagation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    /// First-token or network failure with no deltas emitted yet — the
    /// driver may retry once against `backup_model`.
    Transient,
    /// The inter-token timeout elapsed mid-stream.
    Timeout,
    /// The turn's cancellation token fired.
    Cancelled,
    /// Any other unrecoverable upstream error.
    Other,
}
