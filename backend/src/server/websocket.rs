//! WebSocket change feed
//!
//! Subscribers receive every `HubEvent` as JSON text. The download engine
//! may also push progress events over the same socket; events from one
//! connection are applied in arrival order.

use crate::download::RawProgressEvent;
use crate::hub::HubEvent;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshots so no change falls in between
    let mut events = state.subscribe();
    let initial = [
        HubEvent::Sync(state.sync.snapshot()),
        HubEvent::Downloads(state.downloads.snapshot()),
    ];

    info!("WebSocket client connected");

    // Spawn task to forward changes to the client
    let send_task = tokio::spawn(async move {
        for event in initial {
            if send_json(&mut sender, &event).await.is_err() {
                return;
            }
        }

        loop {
            match events.recv().await {
                Ok(event) => {
                    if send_json(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Inbound messages are progress events from the engine
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<RawProgressEvent>(&text) {
                Ok(raw) => {
                    // Unknown statuses are logged by the hub
                    let _ = state.downloads.apply_raw(raw);
                }
                Err(e) => warn!("Ignoring malformed WebSocket message: {}", e),
            },
            Ok(Message::Close(_)) => {
                info!("WebSocket client disconnected");
                break;
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Cancel the send task when client disconnects
    send_task.abort();
}

/// Send `value` as a JSON text frame; a value that fails to serialize is
/// logged and skipped
async fn send_json<S, T>(sender: &mut S, value: &T) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
    T: Serialize,
{
    match serde_json::to_string(value) {
        Ok(msg) => sender.send(Message::Text(msg.into())).await,
        Err(e) => {
            error!("Failed to serialize WebSocket message, skipping: {}", e);
            Ok(())
        }
    }
}
