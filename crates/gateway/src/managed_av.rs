//! Managed-AV Session Controller (spec §4.6, component F) — the HTTP
//! surface for the mobile client, which exchanges transcripts and control
//! audio instead of driving a live WebSocket. Reuses (A)-(D) through the
//! same [`run_turn`] the telephony loop drives, swapping in [`BufferingSink`]
//! for the `sink` seam (see [`crate::voice::turn`]) instead of streaming
//! frames out over a socket.
//!
//! The completions handler mirrors the teacher's `api::chat::chat`
//! session-lock-held-through-response shape: acquire the per-caller
//! conversation handle, run the turn to completion, return the buffered
//! text, release on drop — just with `ConversationStore::acquire` standing
//! in for the teacher's `session_locks` and `run_turn`/`BufferingSink`
//! standing in for its `TurnInput`/`TurnEvent` channel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, post};
use axum::Router;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
#[cfg(feature = "control-harness")]
use subtle::ConstantTimeEq;

use ringdown_domain::cancel::CancelToken;
use ringdown_domain::conversation::Message as ConversationMessage;
use ringdown_domain::TraceEvent;
use ringdown_tools::StatusObserver;

use crate::state::AppState;
use crate::voice::turn::{run_turn, BufferingSink, TurnContext};

/// One allocated Managed-AV session (spec §3 "Managed-AV Session").
struct ManagedAvSession {
    session_id: String,
    device_id: String,
    agent_id: String,
    room_url: String,
    access_token: String,
    expires_at: DateTime<Utc>,
    pipeline_session_id: Option<String>,
    control_key: Option<String>,
    greeting: Option<String>,
    /// Control-audio messages waiting to be polled via `control/next`.
    /// Nothing in this spec currently enqueues into it — the control
    /// harness is a test-only surface (spec §4.6 Open Question) — so this
    /// is always empty in the default build; it exists so the poll
    /// endpoint has somewhere real to read from once something does.
    control_queue: VecDeque<ControlMessage>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ControlMessage {
    message_id: String,
    prompt_id: Option<String>,
    audio_base64: String,
    sample_rate_hz: u32,
    channels: u8,
    format: String,
    enqueued_at: DateTime<Utc>,
    metadata: serde_json::Value,
}

/// Owns the `session_id → Managed-AV Session` map (spec §4.6).
#[derive(Default)]
pub struct ManagedAvState {
    sessions: Mutex<HashMap<String, ManagedAvSession>>,
}

impl ManagedAvState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evicts every session whose TTL has lapsed. Driven by a periodic
    /// sweep task started from `bootstrap.rs` on
    /// `managed_av.sweep_interval_seconds`.
    pub fn sweep_expired(&self) {
        let now = Utc::now();
        self.sessions.lock().retain(|_, s| s.expires_at > now);
    }
}

/// Device ids are a disjoint namespace from the E.164 phone numbers the
/// telephony path keys the Conversation Store on (spec §3 "Caller
/// Identity" only defines the phone-number case) — prefixing guarantees a
/// mobile device can never collide with, or be confused for, a telephony
/// caller.
fn caller_id_for_device(device_id: &str) -> String {
    format!("managed-av:{device_id}")
}

fn generate_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(feature = "control-harness")]
fn generate_control_key() -> Option<String> {
    Some(uuid::Uuid::new_v4().to_string())
}

#[cfg(not(feature = "control-harness"))]
fn generate_control_key() -> Option<String> {
    None
}

fn error_body(message: impl Into<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": message.into() }))
}

// ──────────────────────── POST /v1/mobile/voice/session ───────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    device_id: String,
    #[serde(default)]
    agent: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ControlMetadata {
    key: String,
    poll_path: &'static str,
}

#[derive(Serialize)]
struct SessionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    control: Option<ControlMetadata>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: String,
    agent: String,
    room_url: String,
    access_token: String,
    expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pipeline_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    greeting: Option<String>,
    metadata: SessionMetadata,
}

fn session_response(session: &ManagedAvSession) -> SessionResponse {
    SessionResponse {
        session_id: session.session_id.clone(),
        agent: session.agent_id.clone(),
        room_url: session.room_url.clone(),
        access_token: session.access_token.clone(),
        expires_at: session.expires_at,
        pipeline_session_id: session.pipeline_session_id.clone(),
        greeting: session.greeting.clone(),
        metadata: SessionMetadata {
            control: session.control_key.clone().map(|key| ControlMetadata {
                key,
                poll_path: "/v1/mobile/managed-av/control/next",
            }),
        },
    }
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let agent = match &body.agent {
        Some(id) => match state.agents.get(id) {
            Some(p) => p.clone(),
            None => {
                return (StatusCode::BAD_REQUEST, error_body(format!("unknown agent: {id}")))
                    .into_response();
            }
        },
        None => match state.agents.resolve(&body.device_id) {
            Ok(p) => p.clone(),
            Err(e) => return (StatusCode::BAD_REQUEST, error_body(e.to_string())).into_response(),
        },
    };

    let ttl = state.config.managed_av.token_ttl_seconds as i64;
    let expires_at = Utc::now() + ChronoDuration::seconds(ttl);
    let mut sessions = state.managed_av.sessions.lock();

    // Token refresh (spec §4.6): a client re-calling this endpoint for a
    // device that already holds a live session rotates the token in
    // place and keeps the same `session_id`, rather than minting a
    // second, disjoint one.
    if let Some(existing) =
        sessions.values_mut().find(|s| s.device_id == body.device_id && s.expires_at > Utc::now())
    {
        existing.access_token = generate_token();
        existing.expires_at = expires_at;
        return (StatusCode::OK, Json(session_response(existing))).into_response();
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let session = ManagedAvSession {
        session_id: session_id.clone(),
        device_id: body.device_id.clone(),
        agent_id: agent.id.clone(),
        room_url: format!("https://av.ringdown.internal/rooms/{session_id}"),
        access_token: generate_token(),
        expires_at,
        pipeline_session_id: None,
        control_key: generate_control_key(),
        greeting: agent.greeting.clone(),
        control_queue: VecDeque::new(),
    };
    let response = session_response(&session);
    sessions.insert(session_id.clone(), session);
    drop(sessions);

    TraceEvent::MobileManagedSessionStarted {
        session_id,
        device_id: body.device_id,
        agent_id: agent.id.clone(),
    }
    .emit();

    (StatusCode::OK, Json(response)).into_response()
}

// ───────────────────── POST /v1/mobile/managed-av/completions ─────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    session_id: String,
    transcript: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionResponse {
    text: String,
    hold: bool,
    reset: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt_id: Option<String>,
}

pub async fn completions(
    State(state): State<AppState>,
    Json(body): Json<CompletionRequest>,
) -> impl IntoResponse {
    let (device_id, agent_id) = {
        let sessions = state.managed_av.sessions.lock();
        match sessions.get(&body.session_id) {
            Some(s) => (s.device_id.clone(), s.agent_id.clone()),
            None => return (StatusCode::NOT_FOUND, error_body("unknown session")).into_response(),
        }
    };

    let agent = match state.agents.get(&agent_id) {
        Some(a) => a.clone(),
        None => {
            return (StatusCode::INTERNAL_SERVER_ERROR, error_body("agent profile no longer configured"))
                .into_response();
        }
    };

    let caller_id = caller_id_for_device(&device_id);
    let handle = match state.sessions.acquire(&caller_id, &agent.id, Some(&agent.prompt)) {
        Ok(h) => h,
        Err(_) => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                error_body("a completion is already in progress for this device"),
            )
                .into_response();
        }
    };

    state.sessions.append(&handle, ConversationMessage::user(body.transcript.clone(), Utc::now()));

    let sink = BufferingSink::new();
    let started = std::time::Instant::now();
    let observer: Option<Arc<dyn StatusObserver>> = None;

    let _outcome = run_turn(TurnContext {
        store: state.sessions.as_ref(),
        handle: &handle,
        agent: &agent,
        providers: state.providers.as_ref(),
        tools: state.tools.as_ref(),
        cancel: CancelToken::new(),
        sink: &sink,
        observer,
        call_id: body.session_id.clone(),
        first_token_timeout_ms: state.config.llm.first_token_timeout_ms,
        inter_token_timeout_ms: state.config.llm.inter_token_timeout_ms,
    })
    .await;

    let text = sink.into_text();
    TraceEvent::MobileManagedCompletion {
        session_id: body.session_id,
        transcript_chars: body.transcript.chars().count(),
        response_chars: text.chars().count(),
        duration_ms: started.elapsed().as_millis() as u64,
    }
    .emit();

    (StatusCode::OK, Json(CompletionResponse { text, hold: false, reset: false, prompt_id: None }))
        .into_response()
}

// ───────────────── DELETE /v1/mobile/managed-av/sessions/{id} ─────────────

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let removed = state.managed_av.sessions.lock().remove(&session_id);
    match removed {
        Some(_) => {
            TraceEvent::MobileManagedSessionClosed { session_id, reason: "client_requested".into() }
                .emit();
            StatusCode::NO_CONTENT.into_response()
        }
        None => (StatusCode::NOT_FOUND, error_body("unknown session")).into_response(),
    }
}

// ───────────────── POST /v1/mobile/managed-av/control/next ────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlNextRequest {
    session_id: String,
}

#[derive(Serialize)]
struct ControlNextResponse {
    message: Option<ControlMessage>,
}

#[cfg(feature = "control-harness")]
pub async fn control_next(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ControlNextRequest>,
) -> impl IntoResponse {
    let provided =
        headers.get("X-Ringdown-Control-Key").and_then(|v| v.to_str().ok()).unwrap_or("");
    let mut sessions = state.managed_av.sessions.lock();
    let session = match sessions.get_mut(&body.session_id) {
        Some(s) => s,
        None => return (StatusCode::NOT_FOUND, error_body("unknown session")).into_response(),
    };
    let expected = match &session.control_key {
        Some(k) => k,
        None => {
            return (StatusCode::FORBIDDEN, error_body("control harness not enabled for this session"))
                .into_response();
        }
    };
    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        return (StatusCode::UNAUTHORIZED, error_body("invalid control key")).into_response();
    }
    let message = session.control_queue.pop_front();
    (StatusCode::OK, Json(ControlNextResponse { message })).into_response()
}

pub fn router() -> Router<AppState> {
    let router = Router::new()
        .route("/v1/mobile/voice/session", post(create_session))
        .route("/v1/mobile/managed-av/completions", post(completions))
        .route("/v1/mobile/managed-av/sessions/:session_id", delete(delete_session));

    #[cfg(feature = "control-harness")]
    let router = router.route("/v1/mobile/managed-av/control/next", post(control_next));

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_id_prefixes_device_id_to_avoid_phone_number_collisions() {
        assert_eq!(caller_id_for_device("iphone-abc123"), "managed-av:iphone-abc123");
    }
}
