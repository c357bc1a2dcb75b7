//! Device registration (spec §6.3) — `POST /v1/mobile/devices/register`.
//!
//! The spec names this endpoint as an external interface without giving it
//! a component section, so it's implemented as a thin handler here, backed
//! by an in-memory registry seeded from `[devices]` config (spec §6.5
//! gives no concrete approval workflow beyond the implication that devices
//! are either known or pending review).

use std::collections::HashSet;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use ringdown_domain::config::DevicesConfig;

use crate::state::AppState;

/// How long a pending device should wait before polling again.
const POLL_AFTER_SECONDS: u64 = 30;

/// Tracks devices pre-approved/denied at config load, plus any first-seen
/// device id that landed in neither list (kept `PENDING` until an operator
/// adds it to `allowlist` and restarts — there's no admin mutation
/// endpoint in this spec).
pub struct DeviceRegistry {
    allowlist: HashSet<String>,
    denylist: HashSet<String>,
    default_agent: Option<String>,
    pending: Mutex<HashSet<String>>,
}

impl DeviceRegistry {
    pub fn new(config: &DevicesConfig, default_agent: Option<String>) -> Self {
        Self {
            allowlist: config.allowlist.iter().cloned().collect(),
            denylist: config.denylist.iter().cloned().collect(),
            default_agent,
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn register(&self, device_id: &str) -> RegisterResponse {
        if self.denylist.contains(device_id) {
            return RegisterResponse {
                status: DeviceStatus::Denied,
                message: Some("this device is not permitted to register".into()),
                poll_after_seconds: None,
                agent: None,
            };
        }
        if self.allowlist.contains(device_id) {
            return RegisterResponse {
                status: DeviceStatus::Approved,
                message: None,
                poll_after_seconds: None,
                agent: self.default_agent.clone(),
            };
        }
        self.pending.lock().insert(device_id.to_string());
        RegisterResponse {
            status: DeviceStatus::Pending,
            message: Some("awaiting manual approval".into()),
            poll_after_seconds: Some(POLL_AFTER_SECONDS),
            agent: None,
        }
    }

    pub fn is_pending(&self, device_id: &str) -> bool {
        self.pending.lock().contains(device_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    Approved,
    Pending,
    Denied,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    device_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    label: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    platform: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    model: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    app_version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    status: DeviceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    poll_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> impl IntoResponse {
    Json(state.devices.register(&body.device_id))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/mobile/devices/register", post(register))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(allow: &[&str], deny: &[&str]) -> DevicesConfig {
        DevicesConfig {
            allowlist: allow.iter().map(|s| s.to_string()).collect(),
            denylist: deny.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn allowlisted_device_is_approved() {
        let registry = DeviceRegistry::new(&cfg(&["iphone-1"], &[]), Some("ringdown-demo".into()));
        let resp = registry.register("iphone-1");
        assert_eq!(resp.status, DeviceStatus::Approved);
        assert_eq!(resp.agent.as_deref(), Some("ringdown-demo"));
    }

    #[test]
    fn denylisted_device_is_denied() {
        let registry = DeviceRegistry::new(&cfg(&[], &["bad-device"]), None);
        let resp = registry.register("bad-device");
        assert_eq!(resp.status, DeviceStatus::Denied);
    }

    #[test]
    fn unknown_device_is_pending_with_poll_interval() {
        let registry = DeviceRegistry::new(&cfg(&[], &[]), None);
        let resp = registry.register("new-phone");
        assert_eq!(resp.status, DeviceStatus::Pending);
        assert_eq!(resp.poll_after_seconds, Some(POLL_AFTER_SECONDS));
        assert!(registry.is_pending("new-phone"));
    }

    #[test]
    fn denylist_takes_priority_over_pending() {
        let registry = DeviceRegistry::new(&cfg(&[], &["bad-device"]), None);
        assert_eq!(registry.register("bad-device").status, DeviceStatus::Denied);
        assert!(!registry.is_pending("bad-device"));
    }
}
