/**
 * Chat Socket Handler
 *
 * `GET /ws/{room_id}/{user_id}[?token=…]` upgrades to a WebSocket carrying
 * one user's side of a room.
 *
 * # Connection
 *
 * Before registration the handler checks, in order:
 * 1. the room exists (else close 4004)
 * 2. the user has a role (else close 4004)
 * 3. the user is the room's student or teacher (else close 4004)
 * 4. the token matches the user when auth is enabled (else close 1008)
 *
 * A rejected socket receives one error frame, then the close frame.
 *
 * # Frames
 *
 * - client → server: raw text, or `{"message_type", "content", "filename"}`
 * - server → client: chat messages as JSON, and `{"error": …}` frames sent
 *   only to the client whose message failed
 *
 * # Tasks
 *
 * The upgrade task reads client frames. A writer task drains the socket's
 * outbound channel, which is fed by the registry and by local error frames.
 * Both stop when the session's token is cancelled, which happens when the
 * same user connects again or the room is deleted.
 */

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::realtime::{Outbox, OutboundFrame, OUTBOX_CAPACITY};
use crate::backend::server::state::AppState;
use crate::shared::chat::{ErrorFrame, Role, RoomId, UserId};

/// Close code for failures that are not the client's fault
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Close reasons must fit a control frame
const MAX_CLOSE_REASON_BYTES: usize = 120;

/// Query string of the socket endpoint
#[derive(Debug, Default, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// Upgrade handler for `GET /ws/{room_id}/{user_id}`
pub async fn handle_chat_socket(
    ws: WebSocketUpgrade,
    Path((room_id, user_id)): Path<(RoomId, UserId)>,
    Query(query): Query<SocketQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, state, room_id, user_id, query.token))
}

async fn open_session(
    state: &AppState,
    room_id: RoomId,
    user_id: UserId,
    token: Option<&str>,
) -> BackendResult<Role> {
    let role = state.chat.admit_connection(room_id, user_id).await?;
    state.auth.authorize(user_id, token)?;
    Ok(role)
}

async fn run_socket(
    mut socket: WebSocket,
    state: AppState,
    room_id: RoomId,
    user_id: UserId,
    token: Option<String>,
) {
    let role = match open_session(&state, room_id, user_id, token.as_deref()).await {
        Ok(role) => role,
        Err(e) => {
            tracing::warn!("[WS] Rejected user {} for room {}: {}", user_id, room_id, e);
            reject(&mut socket, &e).await;
            return;
        }
    };

    let (outbox, mut inbox) = mpsc::channel::<OutboundFrame>(OUTBOX_CAPACITY);
    let ticket = state.registry.connect(room_id, user_id, outbox.clone());
    let (mut sink, mut stream) = socket.split();

    let writer_cancel = ticket.cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = writer_cancel.cancelled() => break,
                frame = inbox.recv() => frame,
            };
            let Some(frame) = frame else { break };
            if let Err(e) = sink.send(Message::Text(frame.as_ref().into())).await {
                tracing::debug!("[WS] Send failed, closing writer: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        let next = tokio::select! {
            _ = ticket.cancel.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                match state.chat.handle_frame(room_id, user_id, role, text.as_str()).await {
                    Ok(admission) => {
                        tracing::debug!("[WS] Frame from user {} in room {}: {:?}", user_id, room_id, admission);
                    }
                    Err(e) => {
                        tracing::warn!("[WS] Message from user {} in room {} failed: {}", user_id, room_id, e);
                        send_error(&outbox, &e);
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!("[WS] Receive error for user {} in room {}: {}", user_id, room_id, e);
                break;
            }
        }
    }

    ticket.cancel.cancel();
    state.registry.disconnect(room_id, user_id, ticket.session_id);
    drop(outbox);
    if let Err(e) = writer.await {
        tracing::error!("[WS] Writer task for user {} ended abnormally: {}", user_id, e);
    }
}

/// Queue an error frame for this socket only
fn send_error(outbox: &Outbox, error: &BackendError) {
    let frame = ErrorFrame::new(error.message());
    match serde_json::to_string(&frame) {
        Ok(json) => {
            if outbox.try_send(OutboundFrame::from(json)).is_err() {
                tracing::debug!("[WS] Could not queue error frame");
            }
        }
        Err(e) => tracing::error!("[WS] Failed to serialize error frame: {}", e),
    }
}

async fn reject(socket: &mut WebSocket, error: &BackendError) {
    if let Ok(json) = serde_json::to_string(&ErrorFrame::new(error.message())) {
        let _ = socket.send(Message::Text(json.into())).await;
    }

    let close = CloseFrame {
        code: error.close_code().unwrap_or(CLOSE_INTERNAL_ERROR),
        reason: close_reason(&error.message()).into(),
    };
    let _ = socket.send(Message::Close(Some(close))).await;
}

fn close_reason(message: &str) -> String {
    let mut reason = String::new();
    for c in message.chars() {
        if reason.len() + c.len_utf8() > MAX_CLOSE_REASON_BYTES {
            break;
        }
        reason.push(c);
    }
    reason
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_respects_byte_limit() {
        assert_eq!(close_reason("Room 3 not found"), "Room 3 not found");

        let long = "방".repeat(100);
        let reason = close_reason(&long);
        assert!(reason.len() <= MAX_CLOSE_REASON_BYTES);
        assert!(long.starts_with(&reason));
    }
}
