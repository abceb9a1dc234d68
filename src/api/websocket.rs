use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use super::state::AppState;
use crate::event_log::LogChange;
use crate::models::Mode;
use crate::replay::ReplayProgress;

#[derive(Debug, Deserialize)]
struct WsIncoming {
    #[serde(rename = "type")]
    msg_type: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsOutgoing<'a> {
    Log(&'a LogChange),
    Replay(&'a ReplayProgress),
    Mode { mode: Mode },
    /// Changes were dropped; the client should refetch `/events`
    Lagged { missed: u64 },
    Pong,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request from client: {}", client_id);
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    tracing::info!("WebSocket connected: {}", client_id);
    state.client_connected(&client_id);

    let (mut sender, mut receiver) = socket.split();
    let (pong_tx, mut pong_rx) = tokio::sync::mpsc::channel::<()>(8);

    let mut changes = state.orchestrator.log().subscribe();
    let mut progress = state.orchestrator.engine().subscribe();
    let mut mode = state.orchestrator.subscribe_mode();

    // Forward log changes, replay progress and mode switches to this client
    let send_task = tokio::spawn(async move {
        loop {
            let json = tokio::select! {
                change = changes.recv() => match change {
                    Ok(change) => serde_json::to_string(&WsOutgoing::Log(&change)),
                    Err(RecvError::Lagged(missed)) => serde_json::to_string(&WsOutgoing::Lagged { missed }),
                    Err(RecvError::Closed) => break,
                },
                event = progress.recv() => match event {
                    Ok(event) => serde_json::to_string(&WsOutgoing::Replay(&event)),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                changed = mode.changed() => match changed {
                    Ok(()) => {
                        let current = *mode.borrow_and_update();
                        serde_json::to_string(&WsOutgoing::Mode { mode: current })
                    }
                    Err(_) => break,
                },
                Some(()) = pong_rx.recv() => serde_json::to_string(&WsOutgoing::Pong),
            };

            let json = match json {
                Ok(j) => j,
                Err(_) => continue,
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Task to handle incoming messages (ping/pong)
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(incoming) = serde_json::from_str::<WsIncoming>(&text) {
                    if incoming.msg_type == "ping" && pong_tx.send(()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.client_disconnected(&client_id);
    tracing::info!("WebSocket disconnected: {}", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_tags() {
        let json = serde_json::to_value(WsOutgoing::Log(&LogChange::Cleared)).unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["change"], "cleared");

        let json = serde_json::to_value(WsOutgoing::Mode { mode: Mode::Recording }).unwrap();
        assert_eq!(json["type"], "mode");
        assert_eq!(json["mode"], "recording");
    }
}
