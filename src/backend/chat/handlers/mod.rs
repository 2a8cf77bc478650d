//! Chat Handlers Module
//!
//! Axum handlers of the chat core.
//!
//! # Module Structure
//!
//! ```text
//! handlers/
//! ├── mod.rs   - Module exports and documentation
//! ├── ws.rs    - WebSocket endpoint
//! └── rooms.rs - Room, help, history and health endpoints
//! ```
//!
//! # Route Handlers
//!
//! ## GET /ws/{room_id}/{user_id}
//!
//! Upgrades to the chat socket. Lookup failures close with 4004, auth
//! failures with 1008.
//!
//! ## POST /rooms/{room_id}/help
//!
//! Toggles help mode and publishes the two transition banners.
//!
//! ## GET /rooms/{room_id}/messages
//!
//! Paged history, newest first.

/// WebSocket endpoint
pub mod ws;

/// REST endpoints
pub mod rooms;

pub use rooms::{create_room, delete_room, get_room, health, list_messages, toggle_help};
pub use ws::handle_chat_socket;
