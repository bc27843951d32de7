use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::shared::AppState;

use super::hub::{Binding, SessionHub};
use super::messages::ClientMessage;

/// WebSocket endpoint. The upgrade itself is unauthenticated; a socket
/// stays unbound until it presents a valid `join` message.
/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state.hub))
}

/// Runs one connection until disconnect. The binding is the per-socket
/// state machine: `None` is unbound, `Some` is bound to a room and role.
async fn handle_connection(socket: WebSocket, hub: Arc<SessionHub>) {
    let connection_id = hub.next_connection_id().await;
    debug!(connection_id, "WebSocket connection established");

    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
    let (mut socket_sender, mut socket_receiver) = socket.split();
    let mut binding: Option<Binding> = None;

    loop {
        tokio::select! {
            // Outbound: hub broadcasts destined for this socket
            outbound = outbound_receiver.recv() => {
                match outbound {
                    Some(payload) => {
                        if socket_sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Inbound: client frames
            inbound = socket_receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(&hub, connection_id, &outbound_sender, &mut binding, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ignore binary/ping/pong
                    Some(Err(error)) => {
                        debug!(connection_id, %error, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    hub.handle_disconnect(connection_id, binding.as_ref()).await;
    info!(connection_id, "WebSocket connection closed");
}

/// Routes one inbound frame through the connection state machine.
/// Malformed frames and messages invalid for the current binding are
/// dropped without a reply.
async fn dispatch(
    hub: &SessionHub,
    connection_id: u64,
    outbound_sender: &mpsc::UnboundedSender<String>,
    binding: &mut Option<Binding>,
    text: &str,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(error) => {
            debug!(connection_id, %error, "Dropping malformed frame");
            return;
        }
    };

    match (message, &*binding) {
        (
            ClientMessage::Join {
                room_id,
                role,
                token,
            },
            None,
        ) => {
            *binding = hub
                .handle_join(
                    connection_id,
                    outbound_sender.clone(),
                    &room_id,
                    role,
                    &token,
                )
                .await;
        }
        (ClientMessage::StartGame { candidates, map_id }, Some(bound)) => {
            hub.handle_start_game(bound, candidates, map_id).await;
        }
        (ClientMessage::ObstacleAction { action }, Some(bound)) => {
            hub.handle_obstacle_action(bound, action).await;
        }
        // Re-join while bound, or round messages while unbound
        (message, _) => {
            debug!(connection_id, message = ?message, "Message invalid for current binding");
        }
    }
}
