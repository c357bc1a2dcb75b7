use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection Lifetime Governor (spec §4.7)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Age at which a voice session is pre-empted with a graceful 4000
    /// close. Spec §4.7: 55 minutes, ahead of the platform's 60-minute
    /// absolute ceiling. There is no separate sweep interval: each voice
    /// session enforces this against its own connection age directly (see
    /// `voice::ws::run_session_loop`), rather than a shared task scanning a
    /// registry.
    #[serde(default = "d_reconnect_deadline_secs")]
    pub reconnect_deadline_seconds: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self { reconnect_deadline_seconds: d_reconnect_deadline_secs() }
    }
}

fn d_reconnect_deadline_secs() -> u64 {
    55 * 60
}
