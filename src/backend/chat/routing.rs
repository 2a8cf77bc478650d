/**
 * Help-mode Routing
 *
 * Decides what happens to each incoming message based on the room's help
 * mode, and performs mode transitions.
 *
 * # States
 *
 * - **AI mode** (`help_checked = false`, initial): students talk to the AI
 *   assistant; teacher messages are dropped.
 * - **Human mode** (`help_checked = true`): students and the teacher talk
 *   directly; the AI stays silent.
 *
 * # Admission
 *
 * The room is re-read from the store for every message, so a toggle made on
 * another replica takes effect immediately. A student's message in AI mode
 * is published first and only then handed to the AI bridge on a separate
 * task; the sender never waits for the AI.
 *
 * # Transitions
 *
 * `toggle_help` flips `help_checked` atomically in the store and publishes
 * the two banners of the mode being entered. Toggles of one room are
 * serialized inside the process so banner pairs never interleave.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::chat::ai_bridge::AiBridge;
use crate::backend::chat::publisher::ChatPublisher;
use crate::backend::error::{BackendError, BackendResult};
use crate::backend::store::{RoomStore, UserDirectory};
use crate::shared::chat::{
    ChatMessage, ClientFrame, HelpMode, MessageBody, MessageId, Role, Room, RoomId, UserId,
};

/// Outcome of an incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Persisted and appended to the fan-out log
    Published {
        message_id: MessageId,
        /// An AI answer was scheduled
        ai_triggered: bool,
    },
    /// Rejected by the current help mode; nothing was persisted
    Dropped,
}

/// Routing core shared by every socket and REST handler
pub struct ChatService {
    rooms: Arc<dyn RoomStore>,
    users: Arc<dyn UserDirectory>,
    publisher: ChatPublisher,
    ai: Arc<AiBridge>,
    max_content_len: usize,
    toggle_locks: Mutex<HashMap<RoomId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChatService {
    pub fn new(
        rooms: Arc<dyn RoomStore>,
        users: Arc<dyn UserDirectory>,
        publisher: ChatPublisher,
        ai: Arc<AiBridge>,
        max_content_len: usize,
    ) -> Self {
        Self {
            rooms,
            users,
            publisher,
            ai,
            max_content_len,
            toggle_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn rooms(&self) -> &Arc<dyn RoomStore> {
        &self.rooms
    }

    /// Validate a connecting socket and resolve the user's role in the room
    pub async fn admit_connection(&self, room_id: RoomId, user_id: UserId) -> BackendResult<Role> {
        if !self.rooms.room_exists(room_id).await? {
            tracing::warn!("[Routing] Connection to unknown room {} by user {}", room_id, user_id);
            return Err(BackendError::RoomNotFound { room_id });
        }

        let Some(directory_role) = self.users.get_user_role(user_id).await? else {
            tracing::warn!("[Routing] No role for user {} (room {})", user_id, room_id);
            return Err(BackendError::UserRoleNotFound { user_id });
        };

        // The seat in the room decides how messages are routed
        let membership = self.rooms.get_membership(room_id).await?;
        let Some(role) = membership.role_of(user_id) else {
            tracing::warn!("[Routing] User {} is not a member of room {}", user_id, room_id);
            return Err(BackendError::NotRoomMember { room_id, user_id });
        };

        if role != directory_role {
            tracing::debug!(
                "[Routing] User {} is a {} in room {} but a {} in the directory",
                user_id,
                role.as_str(),
                room_id,
                directory_role.as_str()
            );
        }
        Ok(role)
    }

    /// Validate and route one raw socket frame
    pub async fn handle_frame(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        role: Role,
        raw: &str,
    ) -> BackendResult<Admission> {
        let body = ClientFrame::parse(raw).into_body(self.max_content_len)?;
        self.handle_incoming(room_id, sender_id, role, body).await
    }

    /// Route a validated message according to the room's current mode
    pub async fn handle_incoming(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        role: Role,
        body: MessageBody,
    ) -> BackendResult<Admission> {
        let room = self.rooms.get_room(room_id).await?;
        let mode = room.mode();

        if role == Role::Teacher && mode == HelpMode::Ai {
            let rejected = BackendError::permission_denied("teachers cannot speak in AI mode");
            tracing::info!(
                "[Routing] Dropped message from teacher {} in room {}: {}",
                sender_id,
                room_id,
                rejected
            );
            return Ok(Admission::Dropped);
        }

        let message = ChatMessage::from_participant(&room, sender_id, role, body);
        self.publisher.publish(&message).await?;

        let ai_triggered = role == Role::Student && mode == HelpMode::Ai;
        if ai_triggered {
            let ai = self.ai.clone();
            let trigger = message.clone();
            tokio::spawn(async move {
                ai.respond(room, trigger).await;
            });
        }

        Ok(Admission::Published {
            message_id: message.id,
            ai_triggered,
        })
    }

    /// Flip the room's help mode on behalf of one of its members
    ///
    /// Returns the room in its new state after both banners were published.
    /// If the durable log refuses them, the flip and both banners are still
    /// recorded and `DeliveryUnavailable` is returned.
    pub async fn toggle_help(&self, room_id: RoomId, actor_id: UserId) -> BackendResult<Room> {
        let membership = self.rooms.get_membership(room_id).await?;
        let Some(role) = membership.role_of(actor_id) else {
            return Err(BackendError::permission_denied(format!(
                "user {actor_id} is not a member of room {room_id}"
            )));
        };

        let lock = self.toggle_lock(room_id);
        let _guard = lock.lock().await;

        let room = self.rooms.toggle_help_checked(room_id).await?;
        let mode = room.mode();
        tracing::info!(
            "[Routing] Room {} switched to {:?} mode by {} {}",
            room_id,
            mode,
            role.as_str(),
            actor_id
        );

        let banners = mode.entry_banners().map(|banner| ChatMessage::system(&room, banner));
        if let Err(e) = self.publisher.publish_all(&banners).await {
            tracing::error!(
                "[Routing] Room {} switched to {:?} but its banners were not fanned out: {}",
                room_id,
                mode,
                e
            );
            return Err(e);
        }

        Ok(room)
    }

    fn toggle_lock(&self, room_id: RoomId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.toggle_locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(room_id).or_default().clone()
    }

    /// Forget in-process state of a deleted room
    pub fn forget_room(&self, room_id: RoomId) {
        let mut locks = self.toggle_locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.remove(&room_id);
    }
}
