//! OpenAI-compatible adapter — the one concrete LLM Streaming Driver (D)
//! adapter this workspace ships (works with OpenAI, Azure OpenAI, Ollama,
//! vLLM, LM Studio, Together, and anything else speaking the OpenAI chat
//! completions wire format).

use std::collections::HashMap;

use serde_json::Value;

use ringdown_domain::config::{AuthMode, ProviderConfig};
use ringdown_domain::conversation::{Message, ToolCall, ToolDefinition};
use ringdown_domain::error::{Error, Result};
use ringdown_domain::stream::{BoxStream, StreamErrorKind, StreamEvent};

use crate::traits::{ChatRequest, LlmProvider};

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Build the adapter from the single configured provider endpoint
    /// (spec §4.4: "the LLM client library (assumed as a streaming
    /// chat-completion adapter)" — one endpoint, model selection happens
    /// per-request via `ChatRequest::model`).
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = match cfg.auth.mode {
            AuthMode::None => None,
            AuthMode::ApiKey => Some(resolve_api_key(cfg)?),
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Transient(e.to_string()))?;

        Ok(Self {
            id: "default".to_string(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url).header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": false},
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

fn resolve_api_key(cfg: &ProviderConfig) -> Result<String> {
    if let Some(key) = &cfg.auth.key {
        return Ok(key.clone());
    }
    if let Some(env_var) = &cfg.auth.env {
        return std::env::var(env_var)
            .map_err(|_| Error::Fatal(format!("env var {env_var} not set for LLM provider auth")));
    }
    Err(Error::Fatal(
        "llm.provider.auth.mode = api_key but neither auth.env nor auth.key is set".into(),
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message / tool serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_openai(msg: &Message) -> Value {
    match msg {
        Message::System { text } => serde_json::json!({"role": "system", "content": text}),
        Message::User { text, .. } => serde_json::json!({"role": "user", "content": text}),
        Message::Assistant { text, tool_calls } => {
            let mut obj = serde_json::json!({"role": "assistant"});
            obj["content"] = match text {
                Some(t) => Value::String(t.clone()),
                None => Value::Null,
            };
            if !tool_calls.is_empty() {
                obj["tool_calls"] = Value::Array(
                    tool_calls
                        .iter()
                        .map(|c| {
                            serde_json::json!({
                                "id": c.id,
                                "type": "function",
                                "function": {
                                    "name": c.name,
                                    "arguments": c.args.to_string(),
                                }
                            })
                        })
                        .collect(),
                );
            }
            obj
        }
        Message::ToolResult { tool_call_id, payload, .. } => serde_json::json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "content": payload.to_string(),
        }),
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE delta parsing — accumulates partial tool-call argument JSON
// per OpenAI's index-keyed delta scheme (spec §4.4: "tolerate partial
// JSON accumulation for tool-call arguments ... emits ToolCallRequest
// only when the argument JSON has parsed successfully").
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buffer: String,
    /// Last successfully-parsed JSON value for this call's argument buffer,
    /// updated as more fragments arrive. Flushed as `ToolCallRequest` once
    /// the model moves on to the next tool call or the turn completes.
    last_parsed: Option<Value>,
    emitted: bool,
}

#[derive(Default)]
struct SseParseState {
    pending: HashMap<u64, PendingToolCall>,
}

impl SseParseState {
    fn flush_index(&mut self, index: u64, out: &mut Vec<StreamEvent>) {
        if let Some(call) = self.pending.get_mut(&index) {
            if !call.emitted {
                if let Some(args_json) = call.last_parsed.take() {
                    out.push(StreamEvent::ToolCallRequest {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        args_json,
                    });
                    call.emitted = true;
                }
            }
        }
    }

    fn flush_all(&mut self, out: &mut Vec<StreamEvent>) {
        let indices: Vec<u64> = self.pending.keys().copied().collect();
        for index in indices {
            self.flush_index(index, out);
        }
    }

    fn parse_data(&mut self, data: &str) -> Vec<StreamEvent> {
        if data.trim() == "[DONE]" {
            return Vec::new();
        }

        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                return vec![StreamEvent::StreamError {
                    kind: StreamErrorKind::Other,
                    message: format!("malformed SSE payload: {e}"),
                }]
            }
        };

        let mut out = Vec::new();

        let choice = match v.get("choices").and_then(|c| c.as_array()).and_then(|a| a.first()) {
            Some(c) => c,
            None => return out,
        };
        let delta = choice.get("delta").unwrap_or(&Value::Null);

        if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
            for tc in tc_arr {
                let index = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0);

                // A new `id` marks the start of a new tool call — flush
                // whatever the previous index had accumulated first.
                if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                    self.flush_all(&mut out);
                    let name = tc
                        .get("function")
                        .and_then(|f| f.get("name"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    self.pending.insert(
                        index,
                        PendingToolCall {
                            id: id.to_string(),
                            name,
                            args_buffer: String::new(),
                            last_parsed: None,
                            emitted: false,
                        },
                    );
                }

                if let Some(frag) = tc
                    .get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(|v| v.as_str())
                {
                    if let Some(call) = self.pending.get_mut(&index) {
                        call.args_buffer.push_str(frag);
                        if let Ok(parsed) = serde_json::from_str::<Value>(&call.args_buffer) {
                            call.last_parsed = Some(parsed);
                        }
                    }
                }
            }
        }

        if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                out.push(StreamEvent::TextDelta { fragment: text.to_string() });
            }
        }

        if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            self.flush_all(&mut out);
            out.push(StreamEvent::TurnComplete { finish_reason: fr.to_string() });
        }

        out
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, StreamEvent>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(&req);

        tracing::debug!(provider = %self.id, model = %req.model, "openai_compat stream request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.unwrap_or_default();
            return Err(Error::Transient(format!("HTTP {} - {}", status.as_u16(), err_text)));
        }

        let mut state = SseParseState::default();
        Ok(crate::sse::sse_response_stream(resp, move |data| state.parse_data(data)))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_is_passed_through() {
        let mut state = SseParseState::default();
        let events = state.parse_data(
            r#"{"choices":[{"delta":{"content":"Hello"},"index":0}]}"#,
        );
        assert!(matches!(&events[0], StreamEvent::TextDelta { fragment } if fragment == "Hello"));
    }

    #[test]
    fn tool_call_emitted_once_args_parse() {
        let mut state = SseParseState::default();
        let start = state.parse_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"t1","function":{"name":"SendEmail","arguments":""}}]}}]}"#,
        );
        assert!(start.is_empty());

        let mid = state.parse_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"to\""}}]}}]}"#,
        );
        assert!(mid.is_empty(), "partial json must not emit yet");

        let done = state.parse_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":":\"dan@example.com\"}"}}]}}]}"#,
        );
        assert!(done.is_empty(), "emission deferred until flush");

        let finish = state.parse_data(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);
        assert!(matches!(
            &finish[0],
            StreamEvent::ToolCallRequest { id, name, .. } if id == "t1" && name == "SendEmail"
        ));
        assert!(matches!(&finish[1], StreamEvent::TurnComplete { finish_reason } if finish_reason == "tool_calls"));
    }

    #[test]
    fn finish_reason_emits_turn_complete() {
        let mut state = SseParseState::default();
        let events = state.parse_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert!(matches!(&events[0], StreamEvent::TurnComplete { finish_reason } if finish_reason == "stop"));
    }

    #[test]
    fn done_sentinel_produces_no_events() {
        let mut state = SseParseState::default();
        assert!(state.parse_data("[DONE]").is_empty());
    }

    #[test]
    fn malformed_json_surfaces_stream_error() {
        let mut state = SseParseState::default();
        let events = state.parse_data("{not json");
        assert!(matches!(&events[0], StreamEvent::StreamError { .. }));
    }
}
