use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Declarative config shape (spec §6.5)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `defaults` block of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default)]
    pub backup_model: Option<String>,
    #[serde(default = "d_voice")]
    pub voice: String,
    #[serde(default = "d_disconnect_secs")]
    pub max_disconnect_seconds: u64,
    #[serde(default = "d_max_tool_iterations")]
    pub max_tool_iterations: u32,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "d_fallback_message")]
    pub fallback_message: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            model: d_model(),
            backup_model: None,
            voice: d_voice(),
            max_disconnect_seconds: d_disconnect_secs(),
            max_tool_iterations: d_max_tool_iterations(),
            tools: Vec::new(),
            fallback_message: d_fallback_message(),
        }
    }
}

/// One entry of the `agents` map, keyed by agent id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntryConfig {
    pub phone_numbers: Vec<String>,
    pub prompt: String,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub backup_model: Option<String>,
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub fallback_message: Option<String>,
    #[serde(default)]
    pub max_tool_iterations: Option<u32>,
    #[serde(default)]
    pub max_disconnect_seconds: Option<u64>,
    /// Defaults to `true`: continue an existing conversation on reconnect
    /// rather than re-greeting.
    #[serde(default)]
    pub continue_conversation: Option<bool>,
    #[serde(default)]
    pub email_greenlist_enforced: Option<bool>,
    #[serde(default)]
    pub email_greenlist: Vec<String>,
    #[serde(default)]
    pub docs_folder_greenlist: Vec<String>,
}

/// Top-level agents section: `defaults` + `agents` map.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentsConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub agents: HashMap<String, AgentEntryConfig>,
    /// Agent id to fall back to when a caller matches no `phone_numbers`
    /// entry (spec §4.2: "if no profile matches, returns the configured
    /// default"). Must name an entry in `agents`.
    #[serde(default)]
    pub default_agent: Option<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_model() -> String {
    "gpt-4o".into()
}
fn d_voice() -> String {
    "alloy".into()
}
fn d_disconnect_secs() -> u64 {
    30
}
fn d_max_tool_iterations() -> u32 {
    8
}
fn d_fallback_message() -> String {
    "Sorry, I hit a snag there. Could you say that again?".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolved Agent Profile (spec §3) — `defaults` merged with one
// `agents` entry, {ToolPrompts} substituted, greenlist patterns
// compiled once at load.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Immutable per-config-load agent profile (spec §3 Agent Profile).
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub id: String,
    pub phone_numbers: Vec<String>,
    pub prompt: String,
    pub model: String,
    pub backup_model: Option<String>,
    pub voice_id: String,
    pub tool_allowlist: std::collections::HashSet<String>,
    pub greeting: Option<String>,
    pub fallback_message: String,
    pub max_tool_iterations: u32,
    pub max_disconnect_seconds: u64,
    pub continue_conversation: bool,
    pub email_greenlist_enforced: bool,
    pub email_greenlist: Vec<regex::Regex>,
    pub docs_folder_greenlist: Vec<regex::Regex>,
}

impl AgentProfile {
    /// Merge `defaults` with one `agents` entry. `tool_prompts` is the
    /// pre-rendered concatenation of enabled tools' usage blurbs, spliced
    /// in for the literal `{ToolPrompts}` token.
    pub fn build(
        id: &str,
        entry: &AgentEntryConfig,
        defaults: &DefaultsConfig,
        tool_prompts: &str,
    ) -> Result<Self, String> {
        let prompt = entry.prompt.replace("{ToolPrompts}", tool_prompts);

        let tool_names = entry.tools.clone().unwrap_or_else(|| defaults.tools.clone());
        let tool_allowlist = tool_names.into_iter().collect();

        let email_greenlist = compile_patterns(&entry.email_greenlist)
            .map_err(|e| format!("agent {id}: invalid email_greenlist pattern: {e}"))?;
        let docs_folder_greenlist = compile_patterns(&entry.docs_folder_greenlist)
            .map_err(|e| format!("agent {id}: invalid docs_folder_greenlist pattern: {e}"))?;

        Ok(Self {
            id: id.to_string(),
            phone_numbers: entry.phone_numbers.clone(),
            prompt,
            model: entry.model.clone().unwrap_or_else(|| defaults.model.clone()),
            backup_model: entry.backup_model.clone().or_else(|| defaults.backup_model.clone()),
            voice_id: entry.voice.clone().unwrap_or_else(|| defaults.voice.clone()),
            tool_allowlist,
            greeting: entry.greeting.clone(),
            fallback_message: entry
                .fallback_message
                .clone()
                .unwrap_or_else(|| defaults.fallback_message.clone()),
            max_tool_iterations: entry
                .max_tool_iterations
                .unwrap_or(defaults.max_tool_iterations),
            max_disconnect_seconds: entry
                .max_disconnect_seconds
                .unwrap_or(defaults.max_disconnect_seconds),
            continue_conversation: entry.continue_conversation.unwrap_or(true),
            email_greenlist_enforced: entry.email_greenlist_enforced.unwrap_or(false),
            email_greenlist,
            docs_folder_greenlist,
        })
    }

    /// True if the caller id matches one of this profile's phone numbers.
    pub fn matches_caller(&self, caller_id: &str) -> bool {
        self.phone_numbers.iter().any(|p| p == caller_id)
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<regex::Regex>, regex::Error> {
    patterns.iter().map(|p| regex::Regex::new(p)).collect()
}
