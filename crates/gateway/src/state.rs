use std::sync::Arc;

use ringdown_domain::config::Config;
use ringdown_providers::registry::ProviderRegistry;
use ringdown_sessions::{AgentRegistry, ConversationStore};
use ringdown_tools::ToolRegistry;

use crate::api::devices::DeviceRegistry;
use crate::managed_av::ManagedAvState;
use crate::turns::TurnRegistry;

/// Shared application state passed to every API/WebSocket handler.
///
/// Fields map directly onto the component table (spec §2): `agents` +
/// `sessions` are (A)+(B), `tools` is (C), `providers` is (D), `turns` is
/// the Turn Handle registry the Voice Session Loop (E) and Managed-AV
/// completions (F) both drive through `voice::turn::run_turn`, and
/// `managed_av`/`devices` are F's and §6.3's own state respectively. The
/// Connection Lifetime Governor (G) is stateless — it's a timer raced
/// inside each session's own loop, not a shared table — so it owns no
/// field here.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub agents: Arc<AgentRegistry>,
    pub sessions: Arc<ConversationStore>,
    pub providers: Arc<ProviderRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub turns: Arc<TurnRegistry>,
    pub managed_av: Arc<ManagedAvState>,
    pub devices: Arc<DeviceRegistry>,
}
