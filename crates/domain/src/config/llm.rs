use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider (single adapter, spec §4.4)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// The single OpenAI-compatible chat-completion endpoint every agent's
    /// `model`/`backup_model` resolve against.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// First-token deadline (spec §5: 10s).
    #[serde(default = "d_first_token_ms")]
    pub first_token_timeout_ms: u64,
    /// Inter-token deadline (spec §5: 20s).
    #[serde(default = "d_inter_token_ms")]
    pub inter_token_timeout_ms: u64,
    /// Startup policy: whether the gateway may boot with no reachable
    /// provider (LLM endpoints then fail until credentials are fixed).
    #[serde(default)]
    pub startup_policy: LlmStartupPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            first_token_timeout_ms: d_first_token_ms(),
            inter_token_timeout_ms: d_inter_token_ms(),
            startup_policy: LlmStartupPolicy::default(),
        }
    }
}

/// Controls how the gateway handles LLM provider initialization at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmStartupPolicy {
    /// Gateway boots even if the provider fails to initialize; voice
    /// sessions close with `Fatal` on first use until fixed.
    #[default]
    AllowNone,
    /// Abort startup if the provider fails to initialize.
    RequireOne,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { base_url: d_base_url(), auth: AuthConfig::default() }
    }
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Env var containing the API key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (config-only setups; prefer `env`).
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    None,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_first_token_ms() -> u64 {
    10_000
}
fn d_inter_token_ms() -> u64 {
    20_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
