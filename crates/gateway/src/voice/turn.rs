//! Turn execution (spec §4.5 "The turn cycle") — drives one streaming call
//! to the LLM Streaming Driver (D), interleaving speech flushes with tool
//! dispatch through the Tool Invocation Engine (C), continuing across
//! tool-result continuations until the turn is genuinely done.
//!
//! Shared by the telephony Voice Session Loop ([`super::ws`]) and the
//! Managed-AV completions endpoint ([`crate::managed_av`]) via the
//! [`TurnSink`] seam: the telephony path streams frames out over the
//! WebSocket as they're flushed, the Managed-AV path just buffers them into
//! one string to return from the HTTP call. Both get identical tool-loop,
//! cancellation, and history-invariant behavior for free.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use ringdown_domain::cancel::CancelToken;
use ringdown_domain::config::AgentProfile;
use ringdown_domain::conversation::{Message, ToolCall};
use ringdown_domain::stream::{StreamErrorKind, StreamEvent};
use ringdown_domain::TraceEvent;
use ringdown_providers::driver::{self, StreamRequest};
use ringdown_providers::registry::ProviderRegistry;
use ringdown_sessions::store::{ConversationHandle, ConversationStore};
use ringdown_tools::{StatusObserver, ToolContext, ToolRegistry};

use super::flush::TextAccumulator;

/// Where a turn's spoken output goes. The telephony loop implements this
/// over its outbound WS channel; Managed-AV completions implement it as a
/// plain string buffer.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn speak(&self, text: &str, last: bool);
    /// Barge-in only; Managed-AV has no live audio queue to clear.
    async fn clear_output(&self) {}
}

/// How one turn (and any tool-result continuations it triggers) concluded.
pub enum TurnOutcome {
    /// The turn completed normally; the session returns to awaiting input.
    Completed,
    /// `ctx.cancel` fired mid-turn (barge-in or a governor-forced close).
    /// Partial assistant text and synthetic tool cancellations are already
    /// recorded in history (spec §4.5 barge-in, §3 ToolResult invariant).
    Cancelled,
    /// The driver surfaced a terminal `StreamError`; an apology has already
    /// been spoken and recorded.
    Error(String),
}

pub struct TurnContext<'a> {
    pub store: &'a ConversationStore,
    pub handle: &'a ConversationHandle,
    pub agent: &'a AgentProfile,
    pub providers: &'a ProviderRegistry,
    pub tools: &'a ToolRegistry,
    pub cancel: CancelToken,
    pub sink: &'a dyn TurnSink,
    pub observer: Option<Arc<dyn StatusObserver>>,
    pub call_id: String,
    pub first_token_timeout_ms: u64,
    pub inter_token_timeout_ms: u64,
}

pub async fn run_turn(ctx: TurnContext<'_>) -> TurnOutcome {
    let agent_ref: Arc<AgentProfile> = Arc::new(ctx.agent.clone());
    let mut total_tool_calls_this_turn = 0usize;

    loop {
        let provider = match ctx.providers.provider() {
            Some(p) => p,
            None => {
                tracing::warn!(call_id = %ctx.call_id, "no LLM provider ready, apologizing");
                ctx.sink.speak(&ctx.agent.fallback_message, true).await;
                ctx.store.append(
                    ctx.handle,
                    Message::assistant(Some(ctx.agent.fallback_message.clone()), vec![]),
                );
                return TurnOutcome::Error("no LLM provider configured".into());
            }
        };

        let snapshot = ctx.store.snapshot(ctx.handle);
        let tool_defs = ctx.tools.schema_for(ctx.agent);
        let req = StreamRequest {
            model: ctx.agent.model.clone(),
            backup_model: ctx.agent.backup_model.clone(),
            messages: snapshot,
            tools: tool_defs,
            first_token_timeout: Duration::from_millis(ctx.first_token_timeout_ms),
            inter_token_timeout: Duration::from_millis(ctx.inter_token_timeout_ms),
        };

        let mut events = driver::stream(provider, req, ctx.cancel.clone()).await;

        let mut turn_text = String::new();
        let mut flush_buf = TextAccumulator::new();
        let mut collected_calls: Vec<ToolCall> = Vec::new();
        let mut cancelled = false;
        let mut error_message: Option<String> = None;

        // Races incoming driver events against the 800ms elapsed-flush
        // deadline (spec §4.5 "Flush policy") so a long run of text with no
        // sentence-terminating punctuation still gets spoken promptly.
        let flush_deadline = tokio::time::sleep(super::flush::ELAPSED_FLUSH);
        tokio::pin!(flush_deadline);

        'events: loop {
            tokio::select! {
                maybe_event = events.next() => {
                    let Some(event) = maybe_event else { break 'events };
                    match event {
                        StreamEvent::TextDelta { fragment } => {
                            turn_text.push_str(&fragment);
                            flush_buf.push(&fragment);
                            if flush_buf.ends_at_sentence_boundary() {
                                if let Some(seg) = flush_buf.take() {
                                    ctx.sink.speak(&seg, false).await;
                                }
                                flush_deadline
                                    .as_mut()
                                    .reset(tokio::time::Instant::now() + super::flush::ELAPSED_FLUSH);
                            }
                        }
                        StreamEvent::ToolCallRequest { id, name, args_json } => {
                            if let Some(seg) = flush_buf.take() {
                                ctx.sink.speak(&seg, false).await;
                            }
                            flush_deadline
                                .as_mut()
                                .reset(tokio::time::Instant::now() + super::flush::ELAPSED_FLUSH);
                            collected_calls.push(ToolCall { id, name, args: args_json });
                        }
                        StreamEvent::TurnComplete { .. } => break 'events,
                        StreamEvent::StreamError { kind, message } => {
                            if kind == StreamErrorKind::Cancelled {
                                cancelled = true;
                            } else {
                                error_message = Some(message);
                            }
                            break 'events;
                        }
                    }
                }
                _ = &mut flush_deadline, if !flush_buf.is_empty() => {
                    if let Some(seg) = flush_buf.take() {
                        ctx.sink.speak(&seg, false).await;
                    }
                    flush_deadline
                        .as_mut()
                        .reset(tokio::time::Instant::now() + super::flush::ELAPSED_FLUSH);
                }
            }
        }

        if cancelled {
            if let Some(seg) = flush_buf.take() {
                ctx.sink.speak(&seg, false).await;
            }
            record_interruption(ctx.store, ctx.handle, turn_text, collected_calls);
            return TurnOutcome::Cancelled;
        }

        if let Some(message) = error_message {
            if let Some(seg) = flush_buf.take() {
                ctx.sink.speak(&seg, false).await;
            }
            tracing::warn!(call_id = %ctx.call_id, error = %message, "llm stream error mid-turn");
            ctx.sink.speak(&ctx.agent.fallback_message, true).await;
            ctx.store.append(
                ctx.handle,
                Message::assistant(Some(ctx.agent.fallback_message.clone()), vec![]),
            );
            return TurnOutcome::Error(message);
        }

        if collected_calls.is_empty() {
            if let Some(seg) = flush_buf.take() {
                ctx.sink.speak(&seg, true).await;
            }
            if !turn_text.trim().is_empty() {
                ctx.store.append(
                    ctx.handle,
                    Message::assistant(Some(turn_text.trim().to_string()), vec![]),
                );
            }
            return TurnOutcome::Completed;
        }

        // This model-turn requested one or more tool calls: flush whatever
        // narration preceded them, bundle them onto a single Assistant
        // message (spec §4.5: "append ... if not yet appended"), then
        // dispatch each in order.
        if let Some(seg) = flush_buf.take() {
            ctx.sink.speak(&seg, false).await;
        }
        let assistant_text =
            if turn_text.trim().is_empty() { None } else { Some(turn_text.trim().to_string()) };
        let ids: Vec<String> = collected_calls.iter().map(|c| c.id.clone()).collect();
        ctx.store.append(
            ctx.handle,
            Message::assistant(assistant_text, collected_calls.clone()),
        );
        ctx.store.mark_pending(ctx.handle, &ids);

        let mut hit_cap = false;
        let mut cancelled_mid_dispatch = false;

        for call in &collected_calls {
            if ctx.cancel.is_cancelled() {
                cancelled_mid_dispatch = true;
                break;
            }
            if total_tool_calls_this_turn >= ctx.agent.max_tool_iterations as usize {
                hit_cap = true;
                let payload = serde_json::json!({
                    "ok": false,
                    "error": "tool_iteration_limit_reached",
                });
                ctx.store.append(ctx.handle, Message::tool_result(&call.id, &call.name, payload));
                ctx.store.resolve_pending(ctx.handle, &call.id);
                continue;
            }
            total_tool_calls_this_turn += 1;

            let tool_ctx = ToolContext {
                caller_id: ctx.handle.caller_id().to_string(),
                agent: agent_ref.clone(),
            };
            let outcome = ctx
                .tools
                .invoke(&call.name, &call.args, &tool_ctx, ctx.cancel.clone(), ctx.observer.clone())
                .await;
            let payload = match outcome {
                Ok(value) => value,
                Err(e) => {
                    TraceEvent::ToolInvocationFailed {
                        call_id: ctx.call_id.clone(),
                        tool_name: call.name.clone(),
                        kind: format!("{e}"),
                    }
                    .emit();
                    e.to_payload()
                }
            };
            ctx.store.append(ctx.handle, Message::tool_result(&call.id, &call.name, payload));
            ctx.store.resolve_pending(ctx.handle, &call.id);
        }

        if cancelled_mid_dispatch {
            // Any call in this batch never reached invoke() — still owed a
            // ToolResult to satisfy the completeness invariant (spec §3, §8.1).
            for call in &collected_calls {
                if ctx.store.resolve_pending(ctx.handle, &call.id) {
                    ctx.store.append(
                        ctx.handle,
                        Message::tool_result(
                            &call.id,
                            &call.name,
                            serde_json::json!({"ok": false, "error": "cancelled"}),
                        ),
                    );
                }
            }
            return TurnOutcome::Cancelled;
        }

        if hit_cap {
            ctx.sink.speak(&ctx.agent.fallback_message, true).await;
            ctx.store.append(
                ctx.handle,
                Message::assistant(Some(ctx.agent.fallback_message.clone()), vec![]),
            );
            return TurnOutcome::Completed;
        }

        // All tool results are in; loop back for the continuation call with
        // the updated snapshot. Does not count against max_tool_iterations
        // itself — only the invocations above did (spec §4.5).
    }
}

/// Barge-in / forced-disconnect bookkeeping (spec §4.5 "Barge-in"): records
/// the partial assistant turn plus a synthetic cancellation for every tool
/// call the model had already requested but that never got dispatched.
fn record_interruption(
    store: &ConversationStore,
    handle: &ConversationHandle,
    turn_text: String,
    collected_calls: Vec<ToolCall>,
) {
    let text = turn_text.trim();
    if text.is_empty() && collected_calls.is_empty() {
        return;
    }
    let assistant_text = if text.is_empty() { None } else { Some(text.to_string()) };
    let ids: Vec<String> = collected_calls.iter().map(|c| c.id.clone()).collect();
    store.append(handle, Message::assistant(assistant_text, collected_calls.clone()));
    store.mark_pending(handle, &ids);
    for call in &collected_calls {
        store.append(
            handle,
            Message::tool_result(
                &call.id,
                &call.name,
                serde_json::json!({"ok": false, "error": "cancelled"}),
            ),
        );
        store.resolve_pending(handle, &call.id);
    }
}

/// A [`TurnSink`] that buffers everything spoken into a single string,
/// exactly what `POST /v1/mobile/managed-av/completions` needs to return.
pub struct BufferingSink {
    buf: parking_lot::Mutex<String>,
}

impl BufferingSink {
    pub fn new() -> Self {
        Self { buf: parking_lot::Mutex::new(String::new()) }
    }

    pub fn into_text(self) -> String {
        self.buf.into_inner()
    }
}

impl Default for BufferingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TurnSink for BufferingSink {
    async fn speak(&self, text: &str, _last: bool) {
        self.buf.lock().push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ringdown_domain::config::{AgentEntryConfig, AgentsConfig, DefaultsConfig};
    use ringdown_domain::stream::BoxStream;
    use ringdown_providers::traits::{ChatRequest, LlmProvider};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn agent(max_tool_iterations: u32) -> AgentProfile {
        let mut agents = HashMap::new();
        agents.insert(
            "demo".to_string(),
            AgentEntryConfig {
                phone_numbers: vec!["+15555550100".into()],
                prompt: "hi".into(),
                tools: Some(vec!["Echo".into()]),
                voice: None,
                model: None,
                backup_model: None,
                greeting: None,
                fallback_message: Some("Sorry, hit a snag.".into()),
                max_tool_iterations: Some(max_tool_iterations),
                max_disconnect_seconds: None,
                continue_conversation: None,
                email_greenlist_enforced: None,
                email_greenlist: vec![],
                docs_folder_greenlist: vec![],
            },
        );
        let cfg = AgentsConfig { defaults: DefaultsConfig::default(), agents, default_agent: None };
        AgentProfile::build(
            "demo",
            cfg.agents.get("demo").unwrap(),
            &cfg.defaults,
            "",
        )
        .unwrap()
    }

    struct ScriptedProvider {
        calls: AtomicUsize,
        scripts: Vec<Vec<StreamEvent>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat_stream(&self, _req: ChatRequest) -> ringdown_domain::error::Result<BoxStream<'static, StreamEvent>> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.get(idx).cloned().unwrap_or_default();
            Ok(Box::pin(futures_util::stream::iter(script)))
        }
        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    fn providers_with(scripts: Vec<Vec<StreamEvent>>) -> ProviderRegistry {
        ProviderRegistry::from_parts(Arc::new(ScriptedProvider { calls: AtomicUsize::new(0), scripts }))
    }

    #[tokio::test]
    async fn pure_text_turn_completes_and_records_assistant_message() {
        let store = ConversationStore::new(40);
        let handle = store.acquire("+15555550100", "demo", Some("sys")).unwrap();
        let a = agent(8);
        let providers = providers_with(vec![vec![
            StreamEvent::TextDelta { fragment: "Hi Dan!".into() },
            StreamEvent::TurnComplete { finish_reason: "stop".into() },
        ]]);
        let tools = ToolRegistry::new();
        let sink = BufferingSink::new();

        let outcome = run_turn(TurnContext {
            store: &store,
            handle: &handle,
            agent: &a,
            providers: &providers,
            tools: &tools,
            cancel: CancelToken::new(),
            sink: &sink,
            observer: None,
            call_id: "CA1".into(),
            first_token_timeout_ms: 10_000,
            inter_token_timeout_ms: 20_000,
        })
        .await;

        assert!(matches!(outcome, TurnOutcome::Completed));
        let snap = store.snapshot(&handle);
        assert!(matches!(snap.last(), Some(Message::Assistant { text: Some(t), .. }) if t == "Hi Dan!"));
    }

    #[tokio::test]
    async fn tool_iteration_cap_of_zero_short_circuits() {
        let store = ConversationStore::new(40);
        let handle = store.acquire("+15555550100", "demo", Some("sys")).unwrap();
        let a = agent(0);
        let providers = providers_with(vec![vec![
            StreamEvent::TextDelta { fragment: "Sending now. ".into() },
            StreamEvent::ToolCallRequest {
                id: "t1".into(),
                name: "Echo".into(),
                args_json: serde_json::json!({}),
            },
            StreamEvent::TurnComplete { finish_reason: "tool_calls".into() },
        ]]);
        let tools = ToolRegistry::new();
        let sink = BufferingSink::new();

        let outcome = run_turn(TurnContext {
            store: &store,
            handle: &handle,
            agent: &a,
            providers: &providers,
            tools: &tools,
            cancel: CancelToken::new(),
            sink: &sink,
            observer: None,
            call_id: "CA1".into(),
            first_token_timeout_ms: 10_000,
            inter_token_timeout_ms: 20_000,
        })
        .await;

        assert!(matches!(outcome, TurnOutcome::Completed));
        assert!(sink.into_text().contains("Sorry, hit a snag."));
    }

    /// A provider whose stream yields one un-punctuated fragment, then sleeps
    /// past the elapsed-flush deadline before completing the turn. Proves
    /// the flush is driven by a live timer racing the event stream, not by
    /// pre-collected events (regression test for the driver no longer
    /// buffering a whole turn before the caller sees anything).
    struct DelayedProvider;

    #[async_trait]
    impl LlmProvider for DelayedProvider {
        async fn chat_stream(&self, _req: ChatRequest) -> ringdown_domain::error::Result<BoxStream<'static, StreamEvent>> {
            Ok(Box::pin(async_stream::stream! {
                yield StreamEvent::TextDelta { fragment: "thinking it over".into() };
                tokio::time::sleep(super::super::flush::ELAPSED_FLUSH + std::time::Duration::from_millis(50)).await;
                yield StreamEvent::TurnComplete { finish_reason: "stop".into() };
            }))
        }
        fn provider_id(&self) -> &str {
            "delayed"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: parking_lot::Mutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl TurnSink for RecordingSink {
        async fn speak(&self, text: &str, last: bool) {
            self.calls.lock().push((text.to_string(), last));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_flush_timer_speaks_before_turn_completes() {
        let store = ConversationStore::new(40);
        let handle = store.acquire("+15555550100", "demo", Some("sys")).unwrap();
        let a = agent(8);
        let providers = ProviderRegistry::from_parts(Arc::new(DelayedProvider));
        let tools = ToolRegistry::new();
        let sink = RecordingSink::default();

        let outcome = run_turn(TurnContext {
            store: &store,
            handle: &handle,
            agent: &a,
            providers: &providers,
            tools: &tools,
            cancel: CancelToken::new(),
            sink: &sink,
            observer: None,
            call_id: "CA1".into(),
            first_token_timeout_ms: 10_000,
            inter_token_timeout_ms: 20_000,
        })
        .await;

        assert!(matches!(outcome, TurnOutcome::Completed));
        let calls = sink.calls.lock();
        assert_eq!(calls.len(), 1, "the un-punctuated fragment must flush exactly once, on the timer");
        assert_eq!(calls[0].0, "thinking it over");
        assert!(!calls[0].1);
    }
}
