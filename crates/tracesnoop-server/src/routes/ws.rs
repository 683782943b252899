//! WebSocket route handler.

use crate::state::AppState;
use crate::websocket::handle_panel_websocket;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};
use std::sync::Arc;

pub async fn events(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    let panel = state.panel.clone();
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_panel_websocket(socket, panel).await {
            tracing::error!(target: "tracesnoop::ws", "Panel WebSocket error: {}", e);
        }
    })
}
