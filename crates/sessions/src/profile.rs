//! Agent Profile Registry (spec §4.2, component B).
//!
//! Read-mostly: profiles are built once from config at startup; resolving a
//! caller id against them is a cheap, side-effect-free lookup.

use std::collections::HashMap;

use ringdown_domain::config::{AgentProfile, AgentsConfig};
use ringdown_domain::error::{Error, Result};

/// Resolves a caller id to an `AgentProfile`.
pub struct AgentRegistry {
    profiles: HashMap<String, AgentProfile>,
    default_agent: Option<String>,
}

impl AgentRegistry {
    /// Build the registry from config, substituting `{ToolPrompts}` via
    /// `tool_prompts_for` (keyed by agent id, concatenation of each enabled
    /// tool's usage blurb).
    pub fn from_config(
        config: &AgentsConfig,
        tool_prompts_for: impl Fn(&str) -> String,
    ) -> std::result::Result<Self, String> {
        let mut profiles = HashMap::new();
        for (id, entry) in &config.agents {
            let tool_prompts = tool_prompts_for(id);
            let profile = AgentProfile::build(id, entry, &config.defaults, &tool_prompts)?;
            profiles.insert(id.clone(), profile);
        }
        Ok(Self {
            profiles,
            default_agent: config.default_agent.clone(),
        })
    }

    /// Resolve `caller_id` against each profile's `phone_numbers`. Falls
    /// back to the configured default agent if no profile matches; fails
    /// with `UnknownCaller` if neither matches nor a default exists.
    pub fn resolve(&self, caller_id: &str) -> Result<&AgentProfile> {
        if let Some(profile) = self.profiles.values().find(|p| p.matches_caller(caller_id)) {
            return Ok(profile);
        }
        if let Some(default_id) = &self.default_agent {
            if let Some(profile) = self.profiles.get(default_id) {
                return Ok(profile);
            }
        }
        Err(Error::UnknownCaller(caller_id.to_string()))
    }

    /// All configured profiles, in no particular order.
    pub fn list_profiles(&self) -> Vec<&AgentProfile> {
        self.profiles.values().collect()
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentProfile> {
        self.profiles.get(agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringdown_domain::config::{AgentEntryConfig, DefaultsConfig};

    fn config_with_one_agent() -> AgentsConfig {
        let mut agents = HashMap::new();
        agents.insert(
            "ringdown-demo".to_string(),
            AgentEntryConfig {
                phone_numbers: vec!["+15555550100".into()],
                prompt: "You are Dan's assistant.".into(),
                tools: None,
                voice: None,
                model: None,
                backup_model: None,
                greeting: Some("Hi Dan!".into()),
                fallback_message: None,
                max_tool_iterations: None,
                max_disconnect_seconds: None,
                continue_conversation: None,
                email_greenlist_enforced: None,
                email_greenlist: vec![],
                docs_folder_greenlist: vec![],
            },
        );
        AgentsConfig {
            defaults: DefaultsConfig::default(),
            agents,
            default_agent: None,
        }
    }

    #[test]
    fn resolve_matches_configured_phone_number() {
        let cfg = config_with_one_agent();
        let registry = AgentRegistry::from_config(&cfg, |_| String::new()).unwrap();
        let profile = registry.resolve("+15555550100").unwrap();
        assert_eq!(profile.id, "ringdown-demo");
    }

    #[test]
    fn resolve_unknown_caller_with_no_default_fails() {
        let cfg = config_with_one_agent();
        let registry = AgentRegistry::from_config(&cfg, |_| String::new()).unwrap();
        let err = registry.resolve("+19995550000").unwrap_err();
        assert!(matches!(err, Error::UnknownCaller(_)));
    }

    #[test]
    fn resolve_unknown_caller_falls_back_to_default_agent() {
        let mut cfg = config_with_one_agent();
        cfg.default_agent = Some("ringdown-demo".to_string());
        let registry = AgentRegistry::from_config(&cfg, |_| String::new()).unwrap();
        let profile = registry.resolve("+19995550000").unwrap();
        assert_eq!(profile.id, "ringdown-demo");
    }

    #[test]
    fn list_profiles_returns_all() {
        let cfg = config_with_one_agent();
        let registry = AgentRegistry::from_config(&cfg, |_| String::new()).unwrap();
        assert_eq!(registry.list_profiles().len(), 1);
    }
}
