/**
 * Connection Registry
 *
 * Process-local map of live sockets, keyed by room and then by user. Each
 * entry owns the sending half of the socket's outbound channel and a
 * cancellation token that closes the socket.
 *
 * # Sessions
 *
 * A `(room_id, user_id)` pair holds at most one session. Connecting again
 * displaces the previous session: its token is cancelled, which makes the
 * old socket's tasks close it. The displaced socket's late `disconnect`
 * carries the old session id and is ignored.
 *
 * # Delivery
 *
 * `deliver` serializes an event once and offers it to every session of the
 * room without waiting. A full or closed channel affects only that session.
 *
 * The registry never persists anything.
 */

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::shared::chat::{ChatMessage, RoomId, UserId};

/// Outbound frames queued per socket before delivery starts dropping
pub const OUTBOX_CAPACITY: usize = 256;

/// Identifies one socket registration
pub type SessionId = Uuid;

/// Pre-serialized text frame, shared by every recipient
pub type OutboundFrame = Arc<str>;

/// Sending half of a socket's outbound channel
pub type Outbox = mpsc::Sender<OutboundFrame>;

struct Session {
    id: SessionId,
    outbox: Outbox,
    cancel: CancellationToken,
}

/// Handle returned to the socket that registered
#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub session_id: SessionId,
    /// Cancelled when the session is displaced or its room is closed
    pub cancel: CancellationToken,
}

/// Live sockets of this process
#[derive(Default)]
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<RoomId, HashMap<UserId, Session>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<RoomId, HashMap<UserId, Session>>> {
        self.rooms.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RoomId, HashMap<UserId, Session>>> {
        self.rooms.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a socket; the room must already be validated by the caller
    pub fn connect(&self, room_id: RoomId, user_id: UserId, outbox: Outbox) -> SessionTicket {
        let ticket = SessionTicket {
            session_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
        };
        let session = Session {
            id: ticket.session_id,
            outbox,
            cancel: ticket.cancel.clone(),
        };

        let displaced = self
            .write()
            .entry(room_id)
            .or_default()
            .insert(user_id, session);

        if let Some(old) = displaced {
            tracing::info!(
                "[Registry] User {} reconnected to room {}; closing session {}",
                user_id,
                room_id,
                old.id
            );
            old.cancel.cancel();
        }

        tracing::info!(
            "[Registry] User {} connected to room {} (session {})",
            user_id,
            room_id,
            ticket.session_id
        );
        ticket
    }

    /// Remove a registration if `session_id` is still the current one
    pub fn disconnect(&self, room_id: RoomId, user_id: UserId, session_id: SessionId) -> bool {
        let mut rooms = self.write();
        let Some(sessions) = rooms.get_mut(&room_id) else {
            return false;
        };

        let current = sessions.get(&user_id).map(|s| s.id);
        if current != Some(session_id) {
            tracing::debug!(
                "[Registry] Ignoring stale disconnect of session {} (user {}, room {})",
                session_id,
                user_id,
                room_id
            );
            return false;
        }

        sessions.remove(&user_id);
        if sessions.is_empty() {
            rooms.remove(&room_id);
        }
        tracing::info!("[Registry] User {} disconnected from room {}", user_id, room_id);
        true
    }

    /// Push an event to every local session of a room
    ///
    /// Returns the number of sessions that accepted it.
    pub fn deliver(&self, room_id: RoomId, message: &ChatMessage) -> usize {
        let frame: OutboundFrame = match serde_json::to_string(message) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                tracing::error!("[Registry] Failed to serialize message {}: {}", message.id, e);
                return 0;
            }
        };

        let rooms = self.read();
        let Some(sessions) = rooms.get(&room_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (user_id, session) in sessions {
            match session.outbox.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        "[Registry] Outbox full for user {} in room {}; dropped message {}",
                        user_id,
                        room_id,
                        message.id
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        "[Registry] Outbox closed for user {} in room {}",
                        user_id,
                        room_id
                    );
                }
            }
        }
        delivered
    }

    /// Close and forget every session of a room
    pub fn close_room(&self, room_id: RoomId) -> usize {
        let sessions = self.write().remove(&room_id).unwrap_or_default();
        for session in sessions.values() {
            session.cancel.cancel();
        }
        if !sessions.is_empty() {
            tracing::info!("[Registry] Closed {} sessions of room {}", sessions.len(), room_id);
        }
        sessions.len()
    }

    pub fn is_connected(&self, room_id: RoomId, user_id: UserId) -> bool {
        self.read()
            .get(&room_id)
            .is_some_and(|sessions| sessions.contains_key(&user_id))
    }

    /// Users with a live session in a room
    pub fn room_members(&self, room_id: RoomId) -> Vec<UserId> {
        self.read()
            .get(&room_id)
            .map(|sessions| sessions.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.read().values().map(HashMap::len).sum()
    }
}
