use serde::Serialize;

/// Structured trace events emitted across the Ringdown workspace.
///
/// `mobile_managed_session_started`, `mobile_managed_completion`, and
/// `mobile_managed_session_closed` are required by spec §4.6; the rest
/// (voice/governor events) are ambient operability additions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    #[serde(rename = "mobile_managed_session_started")]
    MobileManagedSessionStarted {
        session_id: String,
        device_id: String,
        agent_id: String,
    },
    #[serde(rename = "mobile_managed_completion")]
    MobileManagedCompletion {
        session_id: String,
        transcript_chars: usize,
        response_chars: usize,
        duration_ms: u64,
    },
    #[serde(rename = "mobile_managed_session_closed")]
    MobileManagedSessionClosed { session_id: String, reason: String },

    #[serde(rename = "voice_session_started")]
    VoiceSessionStarted {
        call_id: String,
        caller_id: String,
        agent_id: String,
    },
    #[serde(rename = "voice_session_reconnected")]
    VoiceSessionReconnected { call_id: String },
    #[serde(rename = "voice_session_closed")]
    VoiceSessionClosed { call_id: String, reason: String },
    #[serde(rename = "connection_ceiling_reached")]
    ConnectionCeilingReached { call_id: String, age_secs: u64 },
    #[serde(rename = "tool_invocation_failed")]
    ToolInvocationFailed {
        call_id: String,
        tool_name: String,
        kind: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ringdown_event");
    }
}
