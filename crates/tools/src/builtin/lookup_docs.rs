//! `LookupDocs` — illustrative built-in tool mirroring `SendEmail`'s
//! greenlist/`IntegrationDisabled` shape, this time gated on
//! `docs_folder_greenlist` (spec §4.3, §6.5's `agents.*.docs_folder_greenlist`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use ringdown_domain::cancel::CancelToken;

use crate::error::ToolError;
use crate::registry::{ToolContext, ToolHandler, ToolSpec};

const DOCS_ROOT_ENV: &str = "RINGDOWN_DOCS_ROOT";
const MAX_BYTES: usize = 16 * 1024;

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "LookupDocs".into(),
        description: "Read a document from the configured docs folder.".into(),
        arg_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Relative path under the docs folder" },
            },
            "required": ["path"]
        }),
        timeout: std::time::Duration::from_secs(5),
        status_narration: false,
        handler: Arc::new(LookupDocs),
    }
}

struct LookupDocs;

#[async_trait]
impl ToolHandler for LookupDocs {
    async fn call(&self, ctx: &ToolContext, args: Value, _cancel: CancelToken) -> Result<Value, ToolError> {
        let root = std::env::var(DOCS_ROOT_ENV)
            .map_err(|_| ToolError::IntegrationDisabled { reason: "integration_disabled".into() })?;

        let rel_path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("missing required field: path".into()))?;

        if !ctx.agent.docs_folder_greenlist.iter().any(|pattern| pattern.is_match(rel_path)) {
            return Err(ToolError::InvalidArgs(format!(
                "path {rel_path} is not on this agent's docs_folder_greenlist"
            )));
        }

        let resolved = resolve_within(Path::new(&root), rel_path)
            .ok_or_else(|| ToolError::InvalidArgs(format!("path {rel_path} escapes the docs folder")))?;

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::Internal(format!("reading {rel_path}: {e}")))?;

        let truncated = content.len() > MAX_BYTES;
        let text: String = content.chars().take(MAX_BYTES).collect();

        tracing::info!(caller = %ctx.caller_id, path = %rel_path, truncated, "LookupDocs served");
        Ok(serde_json::json!({ "ok": true, "text": text, "truncated": truncated }))
    }
}

/// Join `root` and `rel_path`, rejecting any result that escapes `root`
/// via `..` segments.
fn resolve_within(root: &Path, rel_path: &str) -> Option<PathBuf> {
    let candidate = root.join(rel_path);
    let root = root.canonicalize().ok()?;
    let candidate_parent = candidate.parent()?.canonicalize().ok()?;
    if candidate_parent.starts_with(&root) {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringdown_domain::config::{AgentEntryConfig, AgentProfile, DefaultsConfig};

    fn ctx(greenlist: Vec<&str>) -> ToolContext {
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
            email_greenlist_enforced: None,
            email_greenlist: vec![],
            docs_folder_greenlist: greenlist.into_iter().map(String::from).collect(),
        };
        let agent = AgentProfile::build("demo", &entry, &defaults, "").unwrap();
        ToolContext { caller_id: "+15555550100".into(), agent: Arc::new(agent) }
    }

    #[tokio::test]
    async fn disabled_without_configured_root() {
        std::env::remove_var(DOCS_ROOT_ENV);
        let err = LookupDocs
            .call(&ctx(vec![]), serde_json::json!({"path": "readme.md"}), CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::IntegrationDisabled { reason: "integration_disabled".into() });
    }

    #[tokio::test]
    async fn rejects_path_outside_greenlist() {
        let dir = std::env::temp_dir().join("ringdown-lookup-docs-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::env::set_var(DOCS_ROOT_ENV, &dir);

        let err = LookupDocs
            .call(&ctx(vec![r"^allowed/"]), serde_json::json!({"path": "secret/other.md"}), CancelToken::new())
            .await
            .unwrap_err();
        std::env::remove_var(DOCS_ROOT_ENV);
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn reads_greenlisted_file() {
        let dir = std::env::temp_dir().join("ringdown-lookup-docs-test-ok");
        std::fs::create_dir_all(dir.join("allowed")).unwrap();
        std::fs::write(dir.join("allowed/readme.md"), "hello docs").unwrap();
        std::env::set_var(DOCS_ROOT_ENV, &dir);

        let out = LookupDocs
            .call(&ctx(vec![r"^allowed/"]), serde_json::json!({"path": "allowed/readme.md"}), CancelToken::new())
            .await
            .unwrap();
        std::env::remove_var(DOCS_ROOT_ENV);
        assert_eq!(out["text"], "hello docs");
    }
}
