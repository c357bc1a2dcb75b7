//! `SendEmail` — illustrative built-in tool (spec §4.3/§8 S2/S4). Concrete
//! mail delivery is outside this repo's scope; this tool exercises the
//! engine's greenlist-check and `IntegrationDisabled` contract against a
//! stubbed transport, standing in for whatever mail API a deployment
//! wires in.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use ringdown_domain::cancel::CancelToken;

use crate::error::ToolError;
use crate::registry::{ToolContext, ToolHandler, ToolSpec};

const CREDENTIAL_ENV: &str = "GMAIL_SA_KEY_PATH";

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "SendEmail".into(),
        description: "Send an email on the caller's behalf.".into(),
        arg_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "to": { "type": "string", "description": "Recipient email address" },
                "body": { "type": "string", "description": "Message body" },
            },
            "required": ["to", "body"]
        }),
        timeout: std::time::Duration::from_secs(10),
        status_narration: true,
        handler: Arc::new(SendEmail),
    }
}

struct SendEmail;

#[async_trait]
impl ToolHandler for SendEmail {
    async fn call(&self, ctx: &ToolContext, args: Value, _cancel: CancelToken) -> Result<Value, ToolError> {
        if std::env::var(CREDENTIAL_ENV).is_err() {
            return Err(ToolError::IntegrationDisabled { reason: "integration_disabled".into() });
        }

        let to = args
            .get("to")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("missing required field: to".into()))?;

        if ctx.agent.email_greenlist_enforced
            && !ctx.agent.email_greenlist.iter().any(|pattern| pattern.is_match(to))
        {
            return Err(ToolError::InvalidArgs(format!(
                "recipient {to} is not on this agent's email_greenlist"
            )));
        }

        tracing::info!(caller = %ctx.caller_id, to = %to, "SendEmail dispatched");
        Ok(serde_json::json!({ "ok": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringdown_domain::config::{AgentEntryConfig, AgentProfile, DefaultsConfig};

    fn ctx(enforced: bool, greenlist: Vec<&str>) -> ToolContext {
        let defaults = DefaultsConfig::default();
        let entry = AgentEntryConfig {
            phone_numbers: vec!["+15555550100".into()],
            prompt: "hi".into(),
            tools: None,
            voice: None,
            model: None,
            backup_model: None,
            greeting: None,
            fallback_message: None,
            max_tool_iterations: None,
            max_disconnect_seconds: None,
            continue_conversation: None,
            email_greenlist_enforced: Some(enforced),
            email_greenlist: greenlist.into_iter().map(String::from).collect(),
            docs_folder_greenlist: vec![],
        };
        let agent = AgentProfile::build("demo", &entry, &defaults, "").unwrap();
        ToolContext { caller_id: "+15555550100".into(), agent: Arc::new(agent) }
    }

    #[tokio::test]
    async fn disabled_without_credentials() {
        std::env::remove_var(CREDENTIAL_ENV);
        let err = SendEmail
            .call(&ctx(false, vec![]), serde_json::json!({"to":"dan@example.com","body":"hi"}), CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::IntegrationDisabled { reason: "integration_disabled".into() });
    }

    #[tokio::test]
    async fn greenlist_enforced_rejects_unlisted_recipient() {
        std::env::set_var(CREDENTIAL_ENV, "/tmp/fake-key.json");
        let err = SendEmail
            .call(
                &ctx(true, vec![r"^dan@example\.com$"]),
                serde_json::json!({"to":"stranger@example.com","body":"hi"}),
                CancelToken::new(),
            )
            .await
            .unwrap_err();
        std::env::remove_var(CREDENTIAL_ENV);
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn greenlisted_recipient_succeeds() {
        std::env::set_var(CREDENTIAL_ENV, "/tmp/fake-key.json");
        let out = SendEmail
            .call(
                &ctx(true, vec![r"^dan@example\.com$"]),
                serde_json::json!({"to":"dan@example.com","body":"hi"}),
                CancelToken::new(),
            )
            .await
            .unwrap();
        std::env::remove_var(CREDENTIAL_ENV);
        assert_eq!(out, serde_json::json!({"ok": true}));
    }
}
