//! Tool registry — schema export and dispatch for the Tool Invocation
//! Engine (spec §4.3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;

use ringdown_domain::cancel::CancelToken;
use ringdown_domain::config::AgentProfile;
use ringdown_domain::conversation::ToolDefinition;

use crate::error::{RegisterError, ToolError};

const SCHEMA_202012: &str = "https://json-schema.org/draft/2020-12/schema";

/// Per-invocation context a handler needs beyond its raw arguments — the
/// caller's identity and the resolved agent profile driving this turn, so
/// built-in tools like `SendEmail` can consult the profile's greenlists
/// without the registry threading agent-specific branches through
/// `invoke`.
pub struct ToolContext {
    pub caller_id: String,
    pub agent: Arc<AgentProfile>,
}

/// A registered tool's executable half. Kept separate from [`ToolSpec`] so
/// specs stay `Clone`-able metadata and handlers stay trait objects.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &ToolContext, args: Value, cancel: CancelToken) -> Result<Value, ToolError>;
}

/// Observes "running" narration events for tools with `status_narration`
/// set (spec §4.3: emitted once, within the first 200ms of execution).
pub trait StatusObserver: Send + Sync {
    fn tool_running(&self, tool_name: &str);
}

/// One registered tool: its schema, deadline, and narration policy.
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema (draft 2020-12), `$defs`-only refs, WITHOUT `$schema` —
    /// stamped on export by [`ToolRegistry::schema_for`].
    pub arg_schema: Value,
    pub timeout: Duration,
    pub status_narration: bool,
    pub handler: Arc<dyn ToolHandler>,
}

/// Registry of tools available to invoke, shared across all sessions.
/// Built once at startup; `register` may also be called later for tests,
/// hence the `RwLock` rather than a build-then-freeze shape.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<ToolSpec>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: RwLock::new(HashMap::new()) }
    }

    /// Idempotent only in the sense that re-registering the identical name
    /// fails loudly rather than silently replacing — spec §4.3: "duplicate
    /// names fail with `DuplicateTool`".
    pub fn register(&self, spec: ToolSpec) -> Result<(), RegisterError> {
        let mut tools = self.tools.write();
        if tools.contains_key(&spec.name) {
            return Err(RegisterError::DuplicateTool(spec.name.clone()));
        }
        tools.insert(spec.name.clone(), Arc::new(spec));
        Ok(())
    }

    /// Schemas restricted to `profile`'s allowlist, each stamped with the
    /// draft 2020-12 `$schema` URI (spec §4.3).
    pub fn schema_for(&self, profile: &AgentProfile) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .values()
            .filter(|spec| profile.tool_allowlist.contains(&spec.name))
            .map(|spec| ToolDefinition {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: stamp_schema(&spec.arg_schema),
            })
            .collect()
    }

    /// Render a prompt blurb for the given tool names — one line per name,
    /// `"- {name}: {description}"`, skipping any with no registered spec.
    /// Used to substitute an agent prompt's `{ToolPrompts}` token (spec
    /// §4.2) before that agent's `AgentProfile` (and therefore its
    /// allowlist) exists yet.
    pub fn prompt_blurb(&self, names: &[String]) -> String {
        let tools = self.tools.read();
        names
            .iter()
            .filter_map(|n| tools.get(n).map(|spec| format!("- {}: {}", spec.name, spec.description)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Validate `raw_args_json`, then run the tool under its deadline with
    /// cooperative cancellation. Never returns a process-fatal error — all
    /// failure modes are [`ToolError`] variants meant to become a
    /// `ToolResult` payload.
    pub async fn invoke(
        &self,
        name: &str,
        raw_args_json: &Value,
        ctx: &ToolContext,
        cancel: CancelToken,
        observer: Option<Arc<dyn StatusObserver>>,
    ) -> Result<Value, ToolError> {
        let spec = {
            let tools = self.tools.read();
            tools
                .get(name)
                .cloned()
                .ok_or_else(|| ToolError::Internal(format!("unknown tool: {name}")))?
        };

        validate_args(&spec.arg_schema, raw_args_json)?;

        let done = Arc::new(AtomicBool::new(false));
        if spec.status_narration {
            if let Some(observer) = observer.clone() {
                let done = done.clone();
                let tool_name = spec.name.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    if !done.load(Ordering::Acquire) {
                        observer.tool_running(&tool_name);
                    }
                });
            }
        }

        let handler = spec.handler.clone();
        let args = raw_args_json.clone();
        let cancel_for_task = cancel.clone();
        let ctx_caller_id = ctx.caller_id.clone();
        let ctx_agent = ctx.agent.clone();

        let mut task = tokio::spawn(async move {
            let ctx = ToolContext { caller_id: ctx_caller_id, agent: ctx_agent };
            handler.call(&ctx, args, cancel_for_task).await
        });

        let poll_interval = Duration::from_millis(25);
        let deadline = tokio::time::Instant::now() + spec.timeout;
        let result = loop {
            if cancel.is_cancelled() {
                task.abort();
                break Err(ToolError::Cancelled);
            }
            if tokio::time::Instant::now() >= deadline {
                task.abort();
                break Err(ToolError::Timeout(spec.timeout));
            }
            match tokio::time::timeout(poll_interval, &mut task).await {
                Ok(Ok(outcome)) => break outcome,
                Ok(Err(_join_err)) => break Err(ToolError::Internal("tool task panicked".into())),
                Err(_elapsed) => continue,
            }
        };

        done.store(true, Ordering::Release);
        result
    }
}

fn stamp_schema(schema: &Value) -> Value {
    let mut stamped = schema.clone();
    if let Value::Object(map) = &mut stamped {
        map.entry("$schema").or_insert_with(|| Value::String(SCHEMA_202012.to_string()));
    }
    stamped
}

fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| ToolError::Internal(format!("invalid tool schema: {e}")))?;

    validator.validate(args).map_err(|e| ToolError::InvalidArgs(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringdown_domain::config::{AgentEntryConfig, DefaultsConfig};

    fn profile(tools: Vec<&str>) -> Arc<AgentProfile> {
        let defaults = DefaultsConfig { tools: tools.iter().map(|s| s.to_string()).collect(), ..DefaultsConfig::default() };
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
            docs_folder_greenlist: vec![],
        };
        Arc::new(AgentProfile::build("demo", &entry, &defaults, "").unwrap())
    }

    struct Echo;
    #[async_trait::async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, _ctx: &ToolContext, args: Value, _cancel: CancelToken) -> Result<Value, ToolError> {
            Ok(args)
        }
    }

    fn echo_spec() -> ToolSpec {
        ToolSpec {
            name: "Echo".into(),
            description: "echoes its argument".into(),
            arg_schema: serde_json::json!({
                "type": "object",
                "properties": {"msg": {"type": "string"}},
                "required": ["msg"]
            }),
            timeout: Duration::from_secs(1),
            status_narration: false,
            handler: Arc::new(Echo),
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let reg = ToolRegistry::new();
        reg.register(echo_spec()).unwrap();
        assert_eq!(reg.register(echo_spec()), Err(RegisterError::DuplicateTool("Echo".into())));
    }

    #[test]
    fn schema_for_is_restricted_to_allowlist_and_stamped() {
        let reg = ToolRegistry::new();
        reg.register(echo_spec()).unwrap();

        let allowed = profile(vec!["Echo"]);
        let defs = reg.schema_for(&allowed);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].parameters["$schema"], SCHEMA_202012);

        let disallowed = profile(vec!["SomethingElse"]);
        assert!(reg.schema_for(&disallowed).is_empty());
    }

    #[test]
    fn prompt_blurb_skips_unknown_names_and_joins_known_ones() {
        let reg = ToolRegistry::new();
        reg.register(echo_spec()).unwrap();
        let blurb = reg.prompt_blurb(&["Echo".to_string(), "Nonexistent".to_string()]);
        assert_eq!(blurb, "- Echo: echoes its argument");
    }

    #[tokio::test]
    async fn invoke_validates_before_calling_handler() {
        let reg = ToolRegistry::new();
        reg.register(echo_spec()).unwrap();
        let ctx = ToolContext { caller_id: "+15555550100".into(), agent: profile(vec!["Echo"]) };

        let err = reg
            .invoke("Echo", &serde_json::json!({}), &ctx, CancelToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn invoke_succeeds_with_valid_args() {
        let reg = ToolRegistry::new();
        reg.register(echo_spec()).unwrap();
        let ctx = ToolContext { caller_id: "+15555550100".into(), agent: profile(vec!["Echo"]) };

        let out = reg
            .invoke("Echo", &serde_json::json!({"msg": "hi"}), &ctx, CancelToken::new(), None)
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!({"msg": "hi"}));
    }

    struct Slow;
    #[async_trait::async_trait]
    impl ToolHandler for Slow {
        async fn call(&self, _ctx: &ToolContext, _args: Value, _cancel: CancelToken) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invoke_times_out() {
        let reg = ToolRegistry::new();
        reg.register(ToolSpec {
            name: "Slow".into(),
            description: "never returns in time".into(),
            arg_schema: serde_json::json!({"type": "object"}),
            timeout: Duration::from_millis(50),
            status_narration: false,
            handler: Arc::new(Slow),
        })
        .unwrap();
        let ctx = ToolContext { caller_id: "+15555550100".into(), agent: profile(vec!["Slow"]) };

        let err = reg.invoke("Slow", &serde_json::json!({}), &ctx, CancelToken::new(), None).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn invoke_respects_cancellation() {
        let reg = ToolRegistry::new();
        reg.register(ToolSpec {
            name: "Slow".into(),
            description: "never returns".into(),
            arg_schema: serde_json::json!({"type": "object"}),
            timeout: Duration::from_secs(60),
            status_narration: false,
            handler: Arc::new(Slow),
        })
        .unwrap();
        let ctx = ToolContext { caller_id: "+15555550100".into(), agent: profile(vec!["Slow"]) };
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = reg.invoke("Slow", &serde_json::json!({}), &ctx, cancel, None).await.unwrap_err();
        assert!(matches!(err, ToolError::Cancelled));
    }

    struct CountingObserver(std::sync::atomic::AtomicUsize);
    impl StatusObserver for CountingObserver {
        fn tool_running(&self, _tool_name: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn status_narration_fires_once_for_slow_tools() {
        struct BarelySlow;
        #[async_trait::async_trait]
        impl ToolHandler for BarelySlow {
            async fn call(&self, _ctx: &ToolContext, _args: Value, _cancel: CancelToken) -> Result<Value, ToolError> {
                tokio::time::sleep(Duration::from_millis(350)).await;
                Ok(Value::Null)
            }
        }

        let reg = ToolRegistry::new();
        reg.register(ToolSpec {
            name: "BarelySlow".into(),
            description: "takes longer than 200ms".into(),
            arg_schema: serde_json::json!({"type": "object"}),
            timeout: Duration::from_secs(5),
            status_narration: true,
            handler: Arc::new(BarelySlow),
        })
        .unwrap();
        let ctx = ToolContext { caller_id: "+15555550100".into(), agent: profile(vec!["BarelySlow"]) };
        let observer = Arc::new(CountingObserver(std::sync::atomic::AtomicUsize::new(0)));

        reg.invoke("BarelySlow", &serde_json::json!({}), &ctx, CancelToken::new(), Some(observer.clone()))
            .await
            .unwrap();

        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }
}
