use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic). Every driver adapter
/// converts its provider-specific tool-call wire shape to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// Tool definition exposed to the LLM, restricted to an agent's allowlist
/// by the Tool Invocation Engine (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema (draft 2020-12) for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A single entry in a Conversation Record (spec §3).
///
/// Invariant: every `ToolResult` references a `tool_call_id` previously
/// present on an `Assistant` message earlier in the same sequence; the
/// Voice Session Loop must never resume streaming for a turn that has
/// unresolved tool calls outstanding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        text: String,
    },
    User {
        text: String,
        at: DateTime<Utc>,
    },
    Assistant {
        /// Spoken/partial text accumulated for this message (may be
        /// `None` for a pure tool-call message).
        text: Option<String>,
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        tool_call_id: String,
        name: String,
        payload: serde_json::Value,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System { text: text.into() }
    }

    pub fn user(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Message::User {
            text: text.into(),
            at,
        }
    }

    pub fn assistant(text: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant { text, tool_calls }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Message::ToolResult {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            payload,
        }
    }

    /// The ids of tool calls attached to an `Assistant` message; empty for
    /// every other variant.
    pub fn tool_call_ids(&self) -> Vec<&str> {
        match self {
            Message::Assistant { tool_calls, .. } => {
                tool_calls.iter().map(|c| c.id.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Message::System { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_tool_call_ids_collects_all() {
        let msg = Message::assistant(
            Some("Sending now.".into()),
            vec![ToolCall {
                id: "t1".into(),
                name: "SendEmail".into(),
                args: serde_json::json!({"to": "dan@example.com"}),
            }],
        );
        assert_eq!(msg.tool_call_ids(), vec!["t1"]);
    }

    #[test]
    fn non_assistant_has_no_tool_call_ids() {
        let msg = Message::user("hello", Utc::now());
        assert!(msg.tool_call_ids().is_empty());
    }

    #[test]
    fn system_message_is_recognized() {
        assert!(Message::system("prompt").is_system());
        assert!(!Message::user("hi", Utc::now()).is_system());
    }
}
