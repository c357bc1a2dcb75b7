//! `GET /healthz` (spec §6.4) — a plain liveness probe, no auth, no body
//! beyond the literal text the spec names.

use axum::http::StatusCode;

pub async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
