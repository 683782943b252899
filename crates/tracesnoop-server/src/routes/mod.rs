//! HTTP route handlers.

pub mod ws;

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracesnoop_types::SessionInfo;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Number of connected panels.
    pub panels: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        panels: state.panel.connected(),
    })
}

/// The active managed session, or 404 when there is none.
pub async fn session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionInfo>, StatusCode> {
    state
        .registry
        .active()
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
