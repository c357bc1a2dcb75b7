use ringdown_domain::conversation::{Message, ToolDefinition};
use ringdown_domain::error::Result;
use ringdown_domain::stream::BoxStream;
use ringdown_domain::stream::StreamEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation messages to send, in order.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke, already restricted to the
    /// calling agent's allowlist by the Tool Invocation Engine.
    pub tools: Vec<ToolDefinition>,
    /// Model identifier for this call (the agent's `model` or `backup_model`).
    pub model: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every LLM adapter implements. A single concrete adapter
/// (`OpenAiCompatProvider`) ships with this workspace; the trait exists so
/// the streaming driver never depends on its wire format.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Open a streaming chat completion. The returned stream already
    /// satisfies spec §4.4's four-event contract — `TextDelta` and
    /// `ToolCallRequest` in production order, terminated by exactly one
    /// `TurnComplete` or `StreamError` — including this wire format's own
    /// partial tool-call JSON accumulation. [`crate::driver`] layers
    /// cancellation, timeouts, and backup-model retry on top.
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, StreamEvent>>;

    /// A unique identifier for this provider instance (used in logs).
    fn provider_id(&self) -> &str;
}
