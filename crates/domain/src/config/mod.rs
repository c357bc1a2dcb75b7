mod agents;
mod devices;
mod governor;
mod llm;
mod managed_av;
mod observability;
mod server;

pub use agents::*;
pub use devices::*;
pub use governor::*;
pub use llm::*;
pub use managed_av::*;
pub use observability::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config (spec §6.5 `defaults`/`agents`, plus the ambient
// server/llm/observability/managed_av/governor sections)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(flatten)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub managed_av: ManagedAvConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.llm.provider.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.provider.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        } else if !self.llm.provider.base_url.starts_with("http://")
            && !self.llm.provider.base_url.starts_with("https://")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.provider.base_url".into(),
                message: format!(
                    "base_url must start with http:// or https:// (got \"{}\")",
                    self.llm.provider.base_url
                ),
            });
        }

        let needs_credentials = matches!(self.llm.provider.auth.mode, AuthMode::ApiKey);
        if needs_credentials {
            let has_env = self.llm.provider.auth.env.as_ref().is_some_and(|v| !v.is_empty());
            let has_key = self.llm.provider.auth.key.as_ref().is_some_and(|v| !v.is_empty());
            if !has_env && !has_key {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "llm.provider.auth".into(),
                    message: "ApiKey auth mode but no auth.env or auth.key configured".into(),
                });
            }
        }

        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        if self.agents.agents.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "agents".into(),
                message: "no agent profiles configured".into(),
            });
        }

        for (id, agent) in &self.agents.agents {
            if agent.phone_numbers.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("agents.{id}.phone_numbers"),
                    message: "agent must have at least one phone number".into(),
                });
            }
            if agent.prompt.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("agents.{id}.prompt"),
                    message: "prompt must not be empty".into(),
                });
            }
            for (i, pattern) in agent.email_greenlist.iter().enumerate() {
                if let Err(e) = regex::Regex::new(pattern) {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("agents.{id}.email_greenlist[{i}]"),
                        message: format!("invalid regex \"{pattern}\": {e}"),
                    });
                }
            }
            for (i, pattern) in agent.docs_folder_greenlist.iter().enumerate() {
                if let Err(e) = regex::Regex::new(pattern) {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("agents.{id}.docs_folder_greenlist[{i}]"),
                        message: format!("invalid regex \"{pattern}\": {e}"),
                    });
                }
            }
        }

        // Phone numbers claimed by more than one agent would make caller
        // resolution ambiguous.
        let mut seen_numbers: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
        for (id, agent) in &self.agents.agents {
            for number in &agent.phone_numbers {
                if let Some(other) = seen_numbers.insert(number, id) {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("agents.{id}.phone_numbers"),
                        message: format!(
                            "phone number \"{number}\" is also claimed by agent \"{other}\""
                        ),
                    });
                }
            }
        }

        if let Some(default_agent) = &self.agents.default_agent {
            if !self.agents.agents.contains_key(default_agent) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "agents.default_agent".into(),
                    message: format!("default_agent \"{default_agent}\" is not a configured agent"),
                });
            }
        }

        if self.governor.reconnect_deadline_seconds == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "governor.reconnect_deadline_seconds".into(),
                message: "reconnect_deadline_seconds must be greater than 0".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_config() -> Config {
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
        Config {
            agents: AgentsConfig {
                defaults: DefaultsConfig::default(),
                agents,
                default_agent: Some("ringdown-demo".to_string()),
            },
            server: ServerConfig::default(),
            llm: LlmConfig {
                provider: ProviderConfig {
                    base_url: "https://api.openai.com/v1".into(),
                    auth: AuthConfig {
                        mode: AuthMode::ApiKey,
                        env: Some("OPENAI_API_KEY".into()),
                        key: None,
                    },
                },
                first_token_timeout_ms: 10_000,
                inter_token_timeout_ms: 20_000,
                startup_policy: LlmStartupPolicy::AllowNone,
            },
            observability: ObservabilityConfig::default(),
            managed_av: ManagedAvConfig::default(),
            governor: GovernorConfig::default(),
            devices: DevicesConfig::default(),
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.port").expect("expected server.port error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn provider_base_url_empty_is_error() {
        let mut cfg = valid_config();
        cfg.llm.provider.base_url = String::new();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.provider.base_url").expect("expected base_url error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn provider_invalid_scheme_is_error() {
        let mut cfg = valid_config();
        cfg.llm.provider.base_url = "ws://localhost:1234".into();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "llm.provider.base_url").is_some());
    }

    #[test]
    fn api_key_mode_no_credentials_is_error() {
        let mut cfg = valid_config();
        cfg.llm.provider.auth = AuthConfig {
            mode: AuthMode::ApiKey,
            env: None,
            key: None,
        };
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.provider.auth").expect("expected auth error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn none_auth_mode_no_credentials_is_ok() {
        let mut cfg = valid_config();
        cfg.llm.provider.auth = AuthConfig {
            mode: AuthMode::None,
            env: None,
            key: None,
        };
        let issues = cfg.validate();
        assert!(find_issue(&issues, "llm.provider.auth").is_none());
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = valid_config();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue =
            find_issue(&issues, "server.cors.allowed_origins").expect("expected CORS warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn no_agents_is_warning() {
        let mut cfg = valid_config();
        cfg.agents.agents.clear();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "agents").expect("expected no-agents warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn agent_missing_phone_numbers_is_error() {
        let mut cfg = valid_config();
        cfg.agents.agents.get_mut("ringdown-demo").unwrap().phone_numbers.clear();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "agents.ringdown-demo.phone_numbers").is_some());
    }

    #[test]
    fn duplicate_phone_number_across_agents_is_error() {
        let mut cfg = valid_config();
        cfg.agents.agents.insert(
            "ringdown-second".to_string(),
            AgentEntryConfig {
                phone_numbers: vec!["+15555550100".into()],
                prompt: "Second agent.".into(),
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
            },
        );
        let issues = cfg.validate();
        assert!(issues.iter().any(|e| e.message.contains("also claimed by agent")));
    }

    #[test]
    fn invalid_email_greenlist_pattern_is_error() {
        let mut cfg = valid_config();
        cfg.agents.agents.get_mut("ringdown-demo").unwrap().email_greenlist = vec!["[invalid".into()];
        let issues = cfg.validate();
        assert!(find_issue(&issues, "agents.ringdown-demo.email_greenlist").is_some());
    }

    #[test]
    fn governor_deadline_zero_is_error() {
        let mut cfg = valid_config();
        cfg.governor.reconnect_deadline_seconds = 0;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "governor.reconnect_deadline_seconds").is_some());
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(format!("{err}"), "[ERROR] server.port: port must be greater than 0");
    }
}
