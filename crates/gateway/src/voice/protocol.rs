//! Telephony WebSocket wire protocol (spec §6.1). JSON text frames in both
//! directions, tagged on `type` the way the teacher's `sa_protocol::WsMessage`
//! tags its node-connector frames.

use serde::{Deserialize, Serialize};

/// Gateway → Ringdown.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Setup {
        #[serde(rename = "callSid")]
        call_sid: String,
        from: String,
        #[serde(default)]
        to: String,
        #[serde(default)]
        direction: String,
    },
    Prompt {
        #[serde(rename = "voicePrompt")]
        voice_prompt: String,
        #[serde(default)]
        last: bool,
    },
    Interrupt {
        #[serde(rename = "utteranceUntilInterrupt", default)]
        utterance_until_interrupt: String,
    },
    Dtmf {
        digit: String,
    },
    Error {
        description: String,
    },
    Ping,
    Pong,
    Hangup,
}

/// Ringdown → gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Text {
        token: String,
        last: bool,
    },
    Language {
        #[serde(rename = "ttsLanguage")]
        tts_language: String,
        #[serde(rename = "transcriptionLanguage")]
        transcription_language: String,
    },
    /// Tells the gateway to drop any queued-but-unspoken TTS (barge-in).
    ClearOutput,
    End,
}

pub fn parse_inbound(text: &str) -> Result<InboundFrame, serde_json::Error> {
    serde_json::from_str(text)
}

pub fn encode_outbound(frame: &OutboundFrame) -> String {
    serde_json::to_string(frame).expect("OutboundFrame always serializes")
}
