//! Thin HTTP handlers named as external interfaces by the spec (§6.3
//! device registration, §6.4 health) but not assigned to any lettered
//! component — kept here rather than folded into `managed_av.rs` since
//! they share no state with the Managed-AV Session Controller.

pub mod devices;
pub mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::healthz))
        .merge(devices::router())
}
