//! Turn Handle registry: one cancellation scope per active voice-session
//! turn, keyed by `call_id`.
//!
//! Grounded on the teacher's `runtime/cancel.rs` `CancelMap` (same
//! `Mutex<HashMap<String, _>>` shape), simplified two ways: it reuses
//! [`ringdown_domain::cancel::CancelToken`] instead of a duplicate local
//! type, and it drops the teacher's group-cascade (`add_to_group`) feature
//! — that existed for sub-agent delegation cancelling its children, which
//! has no counterpart here. Spec §5 describes exactly one cancellation
//! token per Turn Handle with no nested scopes.

use std::collections::HashMap;

use parking_lot::Mutex;
use ringdown_domain::cancel::CancelToken;

/// Tracks the live [`CancelToken`] for each call currently mid-turn.
pub struct TurnRegistry {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl Default for TurnRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnRegistry {
    pub fn new() -> Self {
        Self { tokens: Mutex::new(HashMap::new()) }
    }

    /// Start a new turn for `call_id`, replacing (and implicitly
    /// cancelling, via drop of the old entry) any prior token for it.
    pub fn begin(&self, call_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(call_id.to_string(), token.clone());
        token
    }

    /// Cancel the in-flight turn for `call_id`, if any. Returns `true` if a
    /// turn was actually running.
    pub fn cancel(&self, call_id: &str) -> bool {
        match self.tokens.lock().get(call_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Clear the registry entry for `call_id` once its turn has settled.
    pub fn remove(&self, call_id: &str) {
        self.tokens.lock().remove(call_id);
    }

    pub fn is_running(&self, call_id: &str) -> bool {
        self.tokens
            .lock()
            .get(call_id)
            .map(|t| !t.is_cancelled())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_then_cancel_marks_token_cancelled() {
        let registry = TurnRegistry::new();
        let token = registry.begin("call1");
        assert!(!token.is_cancelled());
        assert!(registry.cancel("call1"));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_unknown_call_returns_false() {
        let registry = TurnRegistry::new();
        assert!(!registry.cancel("nope"));
    }

    #[test]
    fn remove_forgets_the_call() {
        let registry = TurnRegistry::new();
        registry.begin("call1");
        registry.remove("call1");
        assert!(!registry.cancel("call1"));
    }

    #[test]
    fn begin_again_replaces_the_old_token() {
        let registry = TurnRegistry::new();
        let first = registry.begin("call1");
        let second = registry.begin("call1");
        registry.cancel("call1");
        assert!(!first.is_cancelled(), "stale handle should not observe the new turn's cancellation");
        assert!(second.is_cancelled());
    }

    #[test]
    fn is_running_reflects_cancellation() {
        let registry = TurnRegistry::new();
        registry.begin("call1");
        assert!(registry.is_running("call1"));
        registry.cancel("call1");
        assert!(!registry.is_running("call1"));
    }
}
