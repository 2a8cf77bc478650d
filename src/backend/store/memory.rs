//! In-memory store
//!
//! Single-process stand-in for [`PgStore`](super::PgStore). State sits behind
//! one mutex, which also makes `toggle_help_checked` atomic.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    page_window, MessageLog, NewRoom, OpenedRoom, RoomStore, StoreError, UserDirectory,
};
use crate::shared::chat::{
    ChatMessage, Membership, MessageId, Role, Room, RoomId, UserId, DEFAULT_ROOM_TITLE,
};

#[derive(Default)]
struct MemoryState {
    rooms: BTreeMap<RoomId, Room>,
    memberships: HashMap<RoomId, Membership>,
    /// Insertion order doubles as the tie-breaking sequence
    messages: Vec<ChatMessage>,
    message_ids: HashSet<MessageId>,
    users: HashMap<UserId, Role>,
    next_room_id: RoomId,
}

/// Process-local implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a user in the directory
    pub fn add_user(&self, user_id: UserId, role: Role) {
        self.lock().users.insert(user_id, role);
    }

    /// Builder-style [`add_user`](Self::add_user)
    pub fn with_user(self, user_id: UserId, role: Role) -> Self {
        self.add_user(user_id, role);
        self
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn room_exists(&self, room_id: RoomId) -> Result<bool, StoreError> {
        Ok(self.lock().rooms.contains_key(&room_id))
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Room, StoreError> {
        self.lock()
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("room", room_id))
    }

    async fn get_membership(&self, room_id: RoomId) -> Result<Membership, StoreError> {
        self.lock()
            .memberships
            .get(&room_id)
            .copied()
            .ok_or_else(|| StoreError::not_found("membership", room_id))
    }

    async fn toggle_help_checked(&self, room_id: RoomId) -> Result<Room, StoreError> {
        let mut state = self.lock();
        let room = state
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| StoreError::not_found("room", room_id))?;
        room.help_checked = !room.help_checked;
        room.updated_at = Utc::now();
        Ok(room.clone())
    }

    async fn open_room(&self, new_room: NewRoom) -> Result<OpenedRoom, StoreError> {
        let mut state = self.lock();

        let existing = state.memberships.values().find(|m| {
            m.student_id == new_room.student_id && m.teacher_id == new_room.teacher_id
        });
        if let Some(membership) = existing.copied() {
            let room = state
                .rooms
                .get(&membership.room_id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("room", membership.room_id))?;
            return Ok(OpenedRoom { room, membership, created: false });
        }

        state.next_room_id += 1;
        let now = Utc::now();
        let room = Room {
            id: state.next_room_id,
            title: new_room
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ROOM_TITLE.to_string()),
            help_checked: false,
            created_at: now,
            updated_at: now,
        };
        let membership = Membership {
            room_id: room.id,
            student_id: new_room.student_id,
            teacher_id: new_room.teacher_id,
        };

        state.rooms.insert(room.id, room.clone());
        state.memberships.insert(room.id, membership);

        Ok(OpenedRoom { room, membership, created: true })
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.rooms.remove(&room_id).is_none() {
            return Err(StoreError::not_found("room", room_id));
        }
        state.memberships.remove(&room_id);
        Ok(())
    }
}

#[async_trait]
impl MessageLog for MemoryStore {
    async fn append_message(&self, message: &ChatMessage) -> Result<MessageId, StoreError> {
        let mut state = self.lock();
        if state.message_ids.insert(message.id) {
            state.messages.push(message.clone());
        }
        Ok(message.id)
    }

    async fn find_messages(
        &self,
        room_id: RoomId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let (limit, offset) = page_window(page, page_size);
        let state = self.lock();

        let mut in_room: Vec<(usize, &ChatMessage)> = state
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.room_id == room_id)
            .collect();
        in_room.sort_by(|(seq_a, a), (seq_b, b)| {
            b.timestamp.cmp(&a.timestamp).then(seq_b.cmp(seq_a))
        });

        Ok(in_room
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn count_messages(&self, room_id: RoomId) -> Result<i64, StoreError> {
        let state = self.lock();
        Ok(state.messages.iter().filter(|m| m.room_id == room_id).count() as i64)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user_role(&self, user_id: UserId) -> Result<Option<Role>, StoreError> {
        Ok(self.lock().users.get(&user_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::chat::MessageBody;
    use assert_matches::assert_matches;

    fn pairing(student_id: UserId, teacher_id: UserId) -> NewRoom {
        NewRoom { title: None, student_id, teacher_id }
    }

    #[tokio::test]
    async fn test_open_room_is_idempotent_per_pairing() {
        let store = MemoryStore::new();

        let first = store.open_room(pairing(1, 2)).await.unwrap();
        assert!(first.created);
        assert_eq!(first.room.title, DEFAULT_ROOM_TITLE);
        assert!(!first.room.help_checked);

        let second = store.open_room(pairing(1, 2)).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.room.id, first.room.id);

        let other = store.open_room(pairing(1, 3)).await.unwrap();
        assert_ne!(other.room.id, first.room.id);
    }

    #[tokio::test]
    async fn test_double_toggle_restores_flag() {
        let store = MemoryStore::new();
        let room = store.open_room(pairing(1, 2)).await.unwrap().room;

        assert!(store.toggle_help_checked(room.id).await.unwrap().help_checked);
        assert!(!store.toggle_help_checked(room.id).await.unwrap().help_checked);
    }

    #[tokio::test]
    async fn test_missing_room() {
        let store = MemoryStore::new();
        assert!(!store.room_exists(99).await.unwrap());
        assert_matches!(
            store.toggle_help_checked(99).await,
            Err(StoreError::NotFound { entity: "room", id: 99 })
        );
        assert_matches!(store.delete_room(99).await, Err(StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_room_removes_membership() {
        let store = MemoryStore::new();
        let room = store.open_room(pairing(1, 2)).await.unwrap().room;

        store.delete_room(room.id).await.unwrap();

        assert!(!store.room_exists(room.id).await.unwrap());
        assert_matches!(store.get_membership(room.id).await, Err(StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_deduplicated() {
        let store = MemoryStore::new();
        let room = store.open_room(pairing(1, 2)).await.unwrap().room;

        let mut ids = Vec::new();
        for i in 0..5 {
            let message = ChatMessage::from_participant(
                &room,
                1,
                Role::Student,
                MessageBody::Text(format!("m{i}")),
            );
            store.append_message(&message).await.unwrap();
            store.append_message(&message).await.unwrap();
            ids.push(message.id);
        }

        assert_eq!(store.count_messages(room.id).await.unwrap(), 5);

        let first_page = store.find_messages(room.id, 1, 2).await.unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].content(), "m4");
        assert_eq!(first_page[1].content(), "m3");

        let last_page = store.find_messages(room.id, 3, 2).await.unwrap();
        assert_eq!(last_page.len(), 1);
        assert_eq!(last_page[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_user_directory() {
        let store = MemoryStore::new().with_user(5, Role::Teacher);
        assert_eq!(store.get_user_role(5).await.unwrap(), Some(Role::Teacher));
        assert_eq!(store.get_user_role(6).await.unwrap(), None);
    }
}
