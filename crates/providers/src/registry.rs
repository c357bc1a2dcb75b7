//! Provider registry — constructs the single configured LLM provider
//! adapter and records initialization failure without aborting startup
//! (spec §7: a missing/misconfigured provider is not `Fatal` at boot, only
//! when a voice session actually needs it).

use std::sync::Arc;

use ringdown_domain::config::{LlmConfig, LlmStartupPolicy};
use ringdown_domain::error::{Error, Result};

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

/// Holds the (at most one) instantiated LLM provider adapter, mirroring the
/// teacher's graceful-degradation registry shape.
pub struct ProviderRegistry {
    provider: Option<Arc<dyn LlmProvider>>,
    init_error: Option<String>,
}

impl ProviderRegistry {
    /// Wrap an already-constructed provider directly, bypassing config
    /// resolution. Used by tests that script an [`LlmProvider`] in-process.
    pub fn from_parts(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider: Some(provider), init_error: None }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        match OpenAiCompatProvider::from_config(&config.provider) {
            Ok(p) => Ok(Self {
                provider: Some(Arc::new(p)),
                init_error: None,
            }),
            Err(e) => {
                if config.startup_policy == LlmStartupPolicy::RequireOne {
                    return Err(Error::Fatal(format!(
                        "LLM provider failed to initialize (startup_policy = require_one): {e}"
                    )));
                }
                tracing::warn!(
                    error = %e,
                    "LLM provider failed to initialize; gateway will boot but voice \
                     sessions will fail until credentials are fixed"
                );
                Ok(Self { provider: None, init_error: Some(e.to_string()) })
            }
        }
    }

    pub fn provider(&self) -> Option<Arc<dyn LlmProvider>> {
        self.provider.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.provider.is_some()
    }

    pub fn init_error(&self) -> Option<&str> {
        self.init_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringdown_domain::config::{AuthConfig, AuthMode, ProviderConfig};

    fn cfg(auth_mode: AuthMode) -> LlmConfig {
        LlmConfig {
            provider: ProviderConfig {
                base_url: "https://api.openai.com/v1".into(),
                auth: AuthConfig { mode: auth_mode, env: None, key: None },
            },
            first_token_timeout_ms: 10_000,
            inter_token_timeout_ms: 20_000,
            startup_policy: LlmStartupPolicy::AllowNone,
        }
    }

    #[test]
    fn missing_credentials_degrades_gracefully_under_allow_none() {
        let registry = ProviderRegistry::from_config(&cfg(AuthMode::ApiKey)).unwrap();
        assert!(!registry.is_ready());
        assert!(registry.init_error().is_some());
    }

    #[test]
    fn missing_credentials_is_fatal_under_require_one() {
        let mut c = cfg(AuthMode::ApiKey);
        c.startup_policy = LlmStartupPolicy::RequireOne;
        assert!(ProviderRegistry::from_config(&c).is_err());
    }

    #[test]
    fn auth_mode_none_initializes_without_credentials() {
        let registry = ProviderRegistry::from_config(&cfg(AuthMode::None)).unwrap();
        assert!(registry.is_ready());
    }
}
