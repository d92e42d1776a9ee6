//! Per-connection WebSocket loop: one read task per client, one outbound
//! pump draining an unbounded channel into the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use imposter_game_common::{ClientRequest, ServerEvent};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatcher::{self, SessionContext};
use crate::state::ServerState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let conn_id = Uuid::new_v4();
    info!(%conn_id, "new websocket connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Outbound pump. A failed send means the client is gone; the read loop
    // notices shortly after.
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut ctx = SessionContext::new(conn_id);
    while let Some(message) = ws_rx.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!(%conn_id, "connection closed by client");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(%conn_id, error = %e, "websocket error");
                break;
            }
        };

        match serde_json::from_str::<ClientRequest>(&text) {
            Ok(request) => dispatcher::handle_request(&state, &mut ctx, &tx, request),
            Err(err) => {
                // An envelope whose type we simply don't know is ignored;
                // everything else malformed gets a generic error back and
                // the connection stays open.
                if let Some(unknown) = unknown_envelope_type(&text) {
                    warn!(%conn_id, message_type = %unknown, "ignoring unknown message type");
                } else {
                    warn!(%conn_id, error = %err, "failed to decode message");
                    if let Some(frame) = ServerState::encode(&ServerEvent::error("Malformed message"))
                    {
                        let _ = tx.send(frame);
                    }
                }
            }
        }
    }

    dispatcher::handle_disconnect(&state, &ctx);
    send_task.abort();
    info!(%conn_id, "connection closed");
}

fn unknown_envelope_type(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    let ty = value.get("type")?.as_str()?;
    if ClientRequest::TYPES.contains(&ty) {
        None
    } else {
        Some(ty.to_string())
    }
}
