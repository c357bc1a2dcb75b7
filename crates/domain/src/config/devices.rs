use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Device registration (spec §6.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Device ids pre-approved at config load (spec §6.3 gives no concrete
/// approval workflow — operators are expected to list known devices
/// here; anything else lands in a pending-review set rather than being
/// rejected outright). `denylist` lets an operator explicitly reject a
/// device id instead of leaving it pending forever.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DevicesConfig {
    #[serde(default)]
    pub allowlist: Vec<String>,
    #[serde(default)]
    pub denylist: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: DevicesConfig = toml::from_str("").unwrap();
        assert!(cfg.allowlist.is_empty());
    }
}
