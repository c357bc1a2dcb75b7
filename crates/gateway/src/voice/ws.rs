//! Telephony Voice Session Loop (spec §4.5, component E) — the WebSocket
//! handler for `GET /ws`. This is the hard core of the repository: one
//! task per connection, merging inbound gateway frames, the currently
//! running turn (if any), an inbound-idle timer, and the Connection
//! Lifetime Governor's deadline into a single `tokio::select!` loop so
//! that every emitted speech/control frame stays strictly ordered (spec
//! §5).
//!
//! Grounded on the teacher's `nodes/ws.rs`: the writer-task/reader-loop
//! split over a bounded `mpsc` channel, and the `wait_for_hello`-style
//! bounded handshake wait, both carry over almost unchanged. What's new is
//! the turn-future-in-a-loop state machine itself, since the teacher's
//! node protocol has no concept of an LLM turn to interleave.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use ringdown_domain::config::AgentProfile;
use ringdown_domain::conversation::Message as ConversationMessage;
use ringdown_domain::TraceEvent;
use ringdown_sessions::normalize_e164;
use ringdown_sessions::store::ConversationHandle;
use ringdown_tools::StatusObserver;

use crate::governor::{RECONNECT_CLOSE_CODE, RECONNECT_CLOSE_REASON, RECONNECT_NOTICE};
use crate::state::AppState;

use super::protocol::{encode_outbound, parse_inbound, InboundFrame, OutboundFrame};
use super::turn::{run_turn, TurnContext, TurnOutcome, TurnSink};

/// A turn future, boxed so it can live in an `Option` across `select!`
/// iterations; borrows the session's store/handle/agent/sink rather than
/// owning clones of them, so nothing here needs to be `'static`.
type TurnFuture<'a> = Pin<Box<dyn Future<Output = TurnOutcome> + Send + 'a>>;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, mut ws_stream) = socket.split();

    let setup = match wait_for_setup(&mut ws_stream).await {
        Some(s) => s,
        None => {
            tracing::warn!("telephony ws disconnected before sending setup");
            return;
        }
    };

    let call_id = setup.call_sid.clone();
    let caller_id = match normalize_e164(&setup.from) {
        Some(c) => c,
        None => {
            tracing::warn!(call_id = %call_id, raw_from = %setup.from, "unparseable caller id, rejecting");
            reject_and_close(ws_sink, "Sorry, I can't identify this call. Goodbye.").await;
            return;
        }
    };

    let agent = match state.agents.resolve(&caller_id) {
        Ok(profile) => profile.clone(),
        Err(e) => {
            tracing::warn!(call_id = %call_id, caller_id = %caller_id, error = %e, "unknown caller, rejecting");
            reject_and_close(ws_sink, "Sorry, I can't take this call right now. Goodbye.").await;
            return;
        }
    };

    let handle = match state.sessions.acquire(&caller_id, &agent.id, Some(&agent.prompt)) {
        Ok(h) => h,
        Err(e) => {
            tracing::info!(call_id = %call_id, caller_id = %caller_id, error = %e, "caller already on an active session");
            reject_and_close(
                ws_sink,
                "You're already on a call with me right now — please try again in a moment. Goodbye.",
            )
            .await;
            return;
        }
    };

    TraceEvent::VoiceSessionStarted {
        call_id: call_id.clone(),
        caller_id: caller_id.clone(),
        agent_id: agent.id.clone(),
    }
    .emit();

    let greeted_before = !state.sessions.is_fresh(&handle);
    if greeted_before {
        TraceEvent::VoiceSessionReconnected { call_id: call_id.clone() }.emit();
    }

    let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(64);
    let writer = tokio::spawn(writer_task(ws_sink, outbound_rx));
    let sink = WsSink { tx: outbound_tx };

    if !greeted_before || !agent.continue_conversation {
        if let Some(greeting) = agent.greeting.clone() {
            speak_greeting(&sink, &greeting).await;
        }
    }

    let close_reason =
        run_session_loop(&state, &mut ws_stream, &handle, &agent, &sink, &call_id).await;

    state.turns.remove(&call_id);
    drop(writer); // dropping the sender side ends the writer task's recv loop
    TraceEvent::VoiceSessionClosed { call_id, reason: close_reason.to_string() }.emit();
    // `handle` drops here, releasing the per-caller lock (spec §4.5 Hangup).
}

/// Why the session loop returned, for the closing trace event only.
#[derive(Debug, Clone, Copy)]
enum CloseReason {
    Hangup,
    TransportClosed,
    TransportError,
    GatewayError,
    InboundIdle,
    GracefulReconnect,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CloseReason::Hangup => "hangup",
            CloseReason::TransportClosed => "transport_closed",
            CloseReason::TransportError => "transport_error",
            CloseReason::GatewayError => "gateway_error",
            CloseReason::InboundIdle => "inbound_idle",
            CloseReason::GracefulReconnect => "graceful_reconnect",
        };
        f.write_str(s)
    }
}

/// The turn cycle + barge-in + governor ceiling (spec §4.5, §4.7), merged
/// into one sequentially-consistent emitter loop (spec §5).
async fn run_session_loop(
    state: &AppState,
    ws_stream: &mut SplitStream<WebSocket>,
    handle: &ConversationHandle,
    agent: &AgentProfile,
    sink: &WsSink,
    call_id: &str,
) -> CloseReason {
    let mut current_turn: Option<TurnFuture<'_>> = None;
    // Set when a barge-in cancelled the in-flight turn before it settled;
    // the new utterance is started once the cancelled turn actually
    // finishes recording its partial state (spec §4.5 Barge-in, step 4).
    let mut pending_after_cancel: Option<String> = None;

    let idle_secs = agent.max_disconnect_seconds.max(1);
    let idle_sleep = tokio::time::sleep(Duration::from_secs(idle_secs));
    tokio::pin!(idle_sleep);

    let governor_sleep =
        tokio::time::sleep(Duration::from_secs(state.config.governor.reconnect_deadline_seconds));
    tokio::pin!(governor_sleep);
    let mut reconnecting = false;

    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        idle_sleep.as_mut().reset(tokio::time::Instant::now() + Duration::from_secs(idle_secs));
                        match parse_inbound(&text) {
                            Ok(InboundFrame::Prompt { voice_prompt, last }) => {
                                if !last {
                                    continue;
                                }
                                if current_turn.is_some() {
                                    // Barge-in via a new final transcript arriving mid-turn
                                    // (spec §4.5 Barge-in).
                                    state.turns.cancel(call_id);
                                    sink.clear_output().await;
                                    pending_after_cancel = Some(voice_prompt);
                                } else {
                                    current_turn = Some(start_turn(state, handle, agent, sink, call_id, voice_prompt));
                                }
                            }
                            Ok(InboundFrame::Interrupt { .. }) => {
                                if current_turn.is_some() {
                                    state.turns.cancel(call_id);
                                    sink.clear_output().await;
                                }
                            }
                            Ok(InboundFrame::Dtmf { digit }) => {
                                tracing::debug!(call_id = %call_id, digit = %digit, "dtmf received (no handler configured)");
                            }
                            Ok(InboundFrame::Error { description }) => {
                                tracing::warn!(call_id = %call_id, error = %description, "gateway reported a transport-side error");
                                return CloseReason::GatewayError;
                            }
                            Ok(InboundFrame::Ping) | Ok(InboundFrame::Pong) => {
                                // Keepalive only; axum handles WS-level ping/pong
                                // automatically, same as the teacher's node loop.
                            }
                            Ok(InboundFrame::Hangup) => {
                                if let Some(turn) = current_turn.take() {
                                    state.turns.cancel(call_id);
                                    drop(turn);
                                }
                                return CloseReason::Hangup;
                            }
                            Ok(InboundFrame::Setup { .. }) => {
                                tracing::debug!(call_id = %call_id, "ignoring duplicate setup frame mid-session");
                            }
                            Err(e) => {
                                tracing::debug!(call_id = %call_id, error = %e, "ignoring unparseable inbound frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => return CloseReason::TransportClosed,
                    Some(Ok(_)) => {
                        // Binary/ping/pong at the WS transport level; no action.
                        idle_sleep.as_mut().reset(tokio::time::Instant::now() + Duration::from_secs(idle_secs));
                    }
                    Some(Err(e)) => {
                        tracing::warn!(call_id = %call_id, error = %e, "telephony ws transport error");
                        return CloseReason::TransportError;
                    }
                    None => return CloseReason::TransportClosed,
                }
            }

            outcome = async { current_turn.as_mut().unwrap().await }, if current_turn.is_some() => {
                current_turn = None;
                state.turns.remove(call_id);
                if let TurnOutcome::Cancelled = outcome {
                    if let Some(text) = pending_after_cancel.take() {
                        current_turn = Some(start_turn(state, handle, agent, sink, call_id, text));
                    }
                }
            }

            _ = &mut idle_sleep => {
                tracing::info!(call_id = %call_id, timeout_secs = idle_secs, "inbound idle timeout exceeded, closing");
                return CloseReason::InboundIdle;
            }

            _ = &mut governor_sleep, if !reconnecting => {
                reconnecting = true;
                if let Some(turn) = current_turn.take() {
                    // Drive the cancelled turn to completion so it records its
                    // partial assistant text / synthetic tool cancellations
                    // before we hang up (spec §4.7: "as in barge-in").
                    state.turns.cancel(call_id);
                    turn.await;
                    state.turns.remove(call_id);
                }
                let age = state.config.governor.reconnect_deadline_seconds;
                TraceEvent::ConnectionCeilingReached { call_id: call_id.to_string(), age_secs: age }.emit();
                sink.speak(RECONNECT_NOTICE, true).await;
                sink.close(RECONNECT_CLOSE_CODE, RECONNECT_CLOSE_REASON).await;
                return CloseReason::GracefulReconnect;
            }
        }
    }
}

/// Speak an agent's greeting split at the first word, matching spec §8's
/// S1 literal example (`text("Hi", last=false)`, `text(" Dan!", last=true)`).
async fn speak_greeting(sink: &WsSink, greeting: &str) {
    match greeting.find(' ') {
        Some(idx) => {
            let (first, rest) = greeting.split_at(idx);
            sink.speak(first, false).await;
            sink.speak(rest, true).await;
        }
        None => sink.speak(greeting, true).await,
    }
}

/// Begin a new turn: append the user's utterance, open a fresh Turn Handle
/// cancellation scope, and box the running `run_turn` future.
fn start_turn<'a>(
    state: &'a AppState,
    handle: &'a ConversationHandle,
    agent: &'a AgentProfile,
    sink: &'a WsSink,
    call_id: &str,
    text: String,
) -> TurnFuture<'a> {
    state.sessions.append(handle, ConversationMessage::user(text, Utc::now()));
    let cancel = state.turns.begin(call_id);
    let observer: Arc<dyn StatusObserver> = Arc::new(LoggingObserver { call_id: call_id.to_string() });

    let ctx = TurnContext {
        store: state.sessions.as_ref(),
        handle,
        agent,
        providers: state.providers.as_ref(),
        tools: state.tools.as_ref(),
        cancel,
        sink,
        observer: Some(observer),
        call_id: call_id.to_string(),
        first_token_timeout_ms: state.config.llm.first_token_timeout_ms,
        inter_token_timeout_ms: state.config.llm.inter_token_timeout_ms,
    };
    Box::pin(run_turn(ctx))
}

/// Logs a tool's "running" narration (spec §4.3); the wire protocol has no
/// frame type for it, so this is operability-only, not spoken.
struct LoggingObserver {
    call_id: String,
}

impl StatusObserver for LoggingObserver {
    fn tool_running(&self, tool_name: &str) {
        tracing::info!(call_id = %self.call_id, tool = %tool_name, "tool running");
    }
}

/// Waits up to 10s for the gateway's `setup` frame, ignoring any keepalive
/// frames that precede it — mirrors the teacher's `wait_for_hello`.
async fn wait_for_setup(stream: &mut SplitStream<WebSocket>) -> Option<SetupData> {
    let wait = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                if let Ok(InboundFrame::Setup { call_sid, from, to, direction }) = parse_inbound(&text) {
                    return Some(SetupData { call_sid, from, to, direction });
                }
            }
        }
        None
    });
    wait.await.unwrap_or(None)
}

struct SetupData {
    call_sid: String,
    from: String,
    #[allow(dead_code)]
    to: String,
    #[allow(dead_code)]
    direction: String,
}

/// Forwards outbound frames to the WS sink until the channel closes or a
/// `Close` frame is sent, at which point it stops (mirrors the teacher's
/// writer task).
async fn writer_task(mut ws_sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if ws_sink.send(msg).await.is_err() {
            break;
        }
        if is_close {
            break;
        }
    }
}

/// Sends a single apology frame followed by `end` and a normal close —
/// used for the `UnknownCaller`/`CallerBusy` rejection paths (spec §7:
/// "surfaced ... session closed [with a] generic rejection message" /
/// "closed politely"), which happen before the writer task exists.
async fn reject_and_close(mut ws_sink: SplitSink<WebSocket, Message>, message: &str) {
    let apology = OutboundFrame::Text { token: message.to_string(), last: true };
    let _ = ws_sink.send(Message::Text(encode_outbound(&apology))).await;
    let _ = ws_sink.send(Message::Text(encode_outbound(&OutboundFrame::End))).await;
    let _ = ws_sink.send(Message::Close(None)).await;
}

/// The telephony-side [`TurnSink`]: speech frames go out over the bounded
/// outbound channel; barge-in sends `clear_output`.
pub struct WsSink {
    tx: mpsc::Sender<Message>,
}

impl WsSink {
    async fn send_frame(&self, frame: &OutboundFrame) {
        let _ = self.tx.send(Message::Text(encode_outbound(frame))).await;
    }

    /// Sends the Governor's graceful-reconnect close (spec §4.7/§6.1: code
    /// 4000, exact reason `"Graceful reconnection required"`).
    async fn close(&self, code: u16, reason: &'static str) {
        let _ = self
            .tx
            .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
            .await;
    }
}

#[async_trait::async_trait]
impl TurnSink for WsSink {
    async fn speak(&self, text: &str, last: bool) {
        self.send_frame(&OutboundFrame::Text { token: text.to_string(), last }).await;
    }

    async fn clear_output(&self) {
        self.send_frame(&OutboundFrame::ClearOutput).await;
    }
}
