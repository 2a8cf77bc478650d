/**
 * Application State
 *
 * `AppState` is the service graph handed to every Axum handler. It is built
 * once by [`init`](crate::backend::server::init) and cloned cheaply per
 * request; every field is an `Arc` or a small value.
 *
 * The `FromRef` implementations let handlers extract only the part they
 * need, e.g. `State(registry): State<Arc<ConnectionRegistry>>`.
 */

use std::sync::Arc;

use axum::extract::FromRef;

use crate::backend::auth::Authenticator;
use crate::backend::chat::routing::ChatService;
use crate::backend::realtime::ConnectionRegistry;
use crate::backend::store::{MessageLog, RoomStore};

/// Shared state of the HTTP and socket handlers
#[derive(Clone)]
pub struct AppState {
    /// Help-mode routing and publishing
    pub chat: Arc<ChatService>,

    /// Sockets connected to this process
    pub registry: Arc<ConnectionRegistry>,

    pub rooms: Arc<dyn RoomStore>,

    pub messages: Arc<dyn MessageLog>,

    /// Token checks; disabled when no JWT secret is configured
    pub auth: Authenticator,
}

impl FromRef<AppState> for Arc<ChatService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.chat.clone()
    }
}

impl FromRef<AppState> for Arc<ConnectionRegistry> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.registry.clone()
    }
}

impl FromRef<AppState> for Authenticator {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth.clone()
    }
}
