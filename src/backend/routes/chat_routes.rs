/**
 * Chat Routes
 *
 * - `GET /ws/{room_id}/{user_id}` - chat socket
 * - `POST /rooms` - open a room
 * - `GET /rooms/{room_id}` / `DELETE /rooms/{room_id}`
 * - `POST /rooms/{room_id}/help` - toggle help mode
 * - `GET /rooms/{room_id}/messages` - history
 * - `GET /health`
 */

use axum::{
    routing::{get, post},
    Router,
};

use crate::backend::chat::handlers::{
    create_room, delete_room, get_room, handle_chat_socket, health, list_messages, toggle_help,
};
use crate::backend::server::state::AppState;

/// Add the chat routes to a router
pub fn configure_chat_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/ws/{room_id}/{user_id}", get(handle_chat_socket))
        .route("/rooms", post(create_room))
        .route("/rooms/{room_id}", get(get_room).delete(delete_room))
        .route("/rooms/{room_id}/help", post(toggle_help))
        .route("/rooms/{room_id}/messages", get(list_messages))
        .route("/health", get(health))
}
