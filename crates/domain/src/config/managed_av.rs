use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Managed-AV Session Controller (spec §4.6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedAvConfig {
    /// Access-token lifetime. Clients are expected to refresh once less
    /// than 20% of this remains (spec §4.6).
    #[serde(default = "d_token_ttl_secs")]
    pub token_ttl_seconds: u64,
    /// How often the sweep in `bootstrap.rs` scans for expired sessions
    /// to evict from the in-memory map.
    #[serde(default = "d_sweep_interval_secs")]
    pub sweep_interval_seconds: u64,
}

impl Default for ManagedAvConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: d_token_ttl_secs(),
            sweep_interval_seconds: d_sweep_interval_secs(),
        }
    }
}

fn d_token_ttl_secs() -> u64 {
    3600
}
fn d_sweep_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_reasonable() {
        let cfg = ManagedAvConfig::default();
        assert_eq!(cfg.token_ttl_seconds, 3600);
        assert_eq!(cfg.sweep_interval_seconds, 60);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ManagedAvConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.token_ttl_seconds, 3600);
    }
}
