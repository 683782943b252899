//! Panel WebSocket: streams snoop events to a connected panel.

use crate::panel::PanelHub;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

pub async fn handle_panel_websocket(socket: WebSocket, panel: Arc<PanelHub>) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Subscribing is what makes the panel count as available.
    let mut event_rx = panel.subscribe();
    tracing::info!(target: "tracesnoop::ws", "Panel connected ({} total)", panel.connected());

    let mut send_task = tokio::spawn(async move {
        loop {
            let json = match event_rx.recv().await {
                Ok(json) => json,
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(target: "tracesnoop::ws", "Panel lagged, skipped {} events", n);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Ping(_) => {
                    tracing::trace!(target: "tracesnoop::ws", "Ping from panel");
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    tracing::info!(target: "tracesnoop::ws", "Panel disconnected");
    Ok(())
}
