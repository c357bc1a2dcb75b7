//! `AppState` construction and background-task spawning, extracted from
//! `main.rs` so the `serve` and `doctor` entry points can share one boot
//! path — grounded on the teacher's `bootstrap.rs::build_app_state` /
//! `spawn_background_tasks` split.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use ringdown_domain::config::Config;
use ringdown_providers::registry::ProviderRegistry;
use ringdown_sessions::store::DEFAULT_WINDOW;
use ringdown_sessions::{AgentRegistry, ConversationStore};
use ringdown_tools::ToolRegistry;

use crate::api::devices::DeviceRegistry;
use crate::managed_av::ManagedAvState;
use crate::state::AppState;
use crate::turns::TurnRegistry;

/// Build a fully-wired [`AppState`] from a validated [`Config`]. Does not
/// bind a listener or spawn background tasks — see [`spawn_background_tasks`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Tool Invocation Engine (C) ───────────────────────────────────
    let tools = Arc::new(ToolRegistry::new());
    ringdown_tools::builtin::register_all(&tools);
    tracing::info!("tool registry ready (built-ins registered)");

    // ── Agent Profile Registry (B) ────────────────────────────────────
    // `{ToolPrompts}` (spec §6.5) is substituted once here, per agent,
    // before any profile exists — so the closure looks the tool names up
    // directly off the raw config entry rather than off an `AgentProfile`.
    let agents = Arc::new(
        AgentRegistry::from_config(&config.agents, |agent_id| {
            let names = config
                .agents
                .agents
                .get(agent_id)
                .map(|entry| entry.tools.clone().unwrap_or_else(|| config.agents.defaults.tools.clone()))
                .unwrap_or_default();
            tools.prompt_blurb(&names)
        })
        .map_err(|e| anyhow::anyhow!("building agent registry: {e}"))?,
    );
    tracing::info!(agent_count = agents.list_profiles().len(), "agent profile registry ready");

    // ── Conversation Store (A) ────────────────────────────────────────
    let sessions = Arc::new(ConversationStore::new(DEFAULT_WINDOW));
    tracing::info!(window = DEFAULT_WINDOW, "conversation store ready");

    // ── LLM Streaming Driver (D) ───────────────────────────────────────
    let providers = Arc::new(
        ProviderRegistry::from_config(&config.llm).context("initializing LLM provider")?,
    );
    if providers.is_ready() {
        tracing::info!("LLM provider ready");
    } else {
        tracing::warn!(
            error = providers.init_error().unwrap_or("unknown"),
            "LLM provider failed to initialize; gateway will boot but voice \
             sessions will apologize and fail until credentials are fixed"
        );
    }

    // ── Turn Handle registry ──────────────────────────────────────────
    let turns = Arc::new(TurnRegistry::new());

    // ── Managed-AV Session Controller (F) ─────────────────────────────
    let managed_av = Arc::new(ManagedAvState::new());

    // ── Device registration (spec §6.3) ───────────────────────────────
    let devices = Arc::new(DeviceRegistry::new(&config.devices, config.agents.default_agent.clone()));

    Ok(AppState {
        config,
        agents,
        sessions,
        providers,
        tools,
        turns,
        managed_av,
        devices,
    })
}

/// Spawn the gateway's periodic background tasks: currently only the
/// Managed-AV session sweep (spec §4.6 — the Connection Lifetime Governor
/// itself needs no sweep, see [`crate::governor`]'s doc comment).
pub fn spawn_background_tasks(state: &AppState) {
    let managed_av = state.managed_av.clone();
    let interval_secs = state.config.managed_av.sweep_interval_seconds.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            managed_av.sweep_expired();
        }
    });
    tracing::info!(interval_secs, "managed-av session sweep started");
}
