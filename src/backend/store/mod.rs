//! Store Module
//!
//! Interfaces the chat core consumes from its persistent collaborators, and
//! two implementations of each:
//!
//! - **`postgres`** - PostgreSQL via sqlx, used in production
//! - **`memory`** - process-local maps, used in tests and when no
//!   `DATABASE_URL` is configured
//!
//! # Interfaces
//!
//! - [`RoomStore`] - room metadata, membership, the `help_checked` flag
//! - [`MessageLog`] - append-only chat history
//! - [`UserDirectory`] - role lookup for connecting users
//!
//! All traits are object safe so the service graph can hold them as
//! `Arc<dyn …>` and swap implementations at startup.

use async_trait::async_trait;
use thiserror::Error;

use crate::shared::chat::{ChatMessage, Membership, MessageId, Role, Room, RoomId, UserId};
use crate::shared::SharedError;

/// In-memory store implementation
pub mod memory;

/// PostgreSQL store implementation
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Largest page size accepted by [`MessageLog::find_messages`]
pub const MAX_PAGE_SIZE: u32 = 100;

/// Errors raised by store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back into a domain value
    #[error("Corrupt row: {0}")]
    Corrupt(#[from] SharedError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Request to open a room for a student/teacher pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub title: Option<String>,
    pub student_id: UserId,
    pub teacher_id: UserId,
}

/// Result of [`RoomStore::open_room`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedRoom {
    pub room: Room,
    pub membership: Membership,
    /// `false` when the pairing already had a room
    pub created: bool,
}

/// Room metadata and membership
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn room_exists(&self, room_id: RoomId) -> Result<bool, StoreError>;

    async fn get_room(&self, room_id: RoomId) -> Result<Room, StoreError>;

    async fn get_membership(&self, room_id: RoomId) -> Result<Membership, StoreError>;

    /// Flip `help_checked` atomically and return the updated room
    ///
    /// Concurrent toggles of one room must serialize; two toggles always
    /// yield the original value.
    async fn toggle_help_checked(&self, room_id: RoomId) -> Result<Room, StoreError>;

    /// Create the room of a pairing, or return the existing one
    async fn open_room(&self, new_room: NewRoom) -> Result<OpenedRoom, StoreError>;

    /// Delete a room and its membership
    async fn delete_room(&self, room_id: RoomId) -> Result<(), StoreError>;
}

/// Append-only chat history
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Persist a message; appending the same id twice is a no-op
    async fn append_message(&self, message: &ChatMessage) -> Result<MessageId, StoreError>;

    /// One page of a room's history, newest first
    ///
    /// `page` is 1-based; `page_size` is clamped to [`MAX_PAGE_SIZE`].
    async fn find_messages(
        &self,
        room_id: RoomId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    async fn count_messages(&self, room_id: RoomId) -> Result<i64, StoreError>;
}

/// Role lookup for users owned by the account system
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_role(&self, user_id: UserId) -> Result<Option<Role>, StoreError>;
}

/// Normalize a 1-based page request into `(limit, offset)`
pub(crate) fn page_window(page: u32, page_size: u32) -> (i64, i64) {
    let size = page_size.clamp(1, MAX_PAGE_SIZE) as i64;
    let page = page.max(1) as i64;
    (size, (page - 1) * size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(1, 20), (20, 0));
        assert_eq!(page_window(3, 20), (20, 40));
        assert_eq!(page_window(0, 20), (20, 0));
        assert_eq!(page_window(2, 1000), (100, 100));
        assert_eq!(page_window(1, 0), (1, 0));
    }
}
