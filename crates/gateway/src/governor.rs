//! Connection Lifetime Governor (spec §4.7, component G).
//!
//! The platform enforces an absolute 60-minute ceiling per WebSocket; at
//! 55 minutes Ringdown must pre-empt it with a graceful in-band
//! reconnect. Unlike the teacher's node registry (which sweeps a shared
//! map on an interval task to find stale peers), there is nothing to
//! sweep here: each voice session already owns its one connection's age
//! for its entire lifetime, so the ceiling is simplest to enforce as a
//! single `tokio::time::sleep` raced inside that session's own event loop
//! (see [`crate::voice::ws::run_session_loop`]) rather than as a second
//! task scanning a registry no one else needs. This module only holds the
//! constants both that loop and its tests share.

/// Close code the gateway must treat as "reconnect now with the same
/// `callSid`" (spec §4.7 / §6.1).
pub const RECONNECT_CLOSE_CODE: u16 = 4000;

/// The exact reason string spec §4.7/§6.1 require — the gateway matches on
/// this literally, so it is not free-form operator text.
pub const RECONNECT_CLOSE_REASON: &str = "Graceful reconnection required";

/// Pre-recorded notice spoken immediately before the close frame (spec
/// §4.7, point 1).
pub const RECONNECT_NOTICE: &str = "I need to briefly reconnect…";
