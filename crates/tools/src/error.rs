//! Error taxonomy for the Tool Invocation Engine (spec §4.3).
//!
//! Distinct from [`ringdown_domain::error::Error`]: invocation failures are
//! always surfaced as a structured result to the driver/turn loop, never
//! propagated as the process-wide error type — a tool failing is routine,
//! not exceptional.

use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    /// Missing credentials or an unconfigured external dependency. Carries
    /// a machine-readable reason; never raised as a fatal error.
    #[error("integration disabled: {reason}")]
    IntegrationDisabled { reason: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// The `{ok:false, ...}` shape a `ToolResult` message carries — spec
    /// §4.3/§7: disabled integrations and validation failures are data, not
    /// exceptions.
    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            ToolError::IntegrationDisabled { reason } => {
                serde_json::json!({ "ok": false, "disabled": true, "reason": reason })
            }
            ToolError::InvalidArgs(detail) => {
                serde_json::json!({ "ok": false, "error": "invalid_args", "detail": detail })
            }
            ToolError::Timeout(_) => serde_json::json!({ "ok": false, "error": "timeout" }),
            ToolError::Cancelled => serde_json::json!({ "ok": false, "error": "cancelled" }),
            ToolError::RateLimited(detail) => {
                serde_json::json!({ "ok": false, "error": "rate_limited", "detail": detail })
            }
            ToolError::Internal(detail) => {
                serde_json::json!({ "ok": false, "error": "internal", "detail": detail })
            }
        }
    }
}

/// `register` failure (spec §4.3: "idempotent; duplicate names fail with
/// `DuplicateTool`").
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),
}
