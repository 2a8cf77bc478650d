//! PostgreSQL store
//!
//! Rooms, membership, chat history and user roles live in one database.
//! The schema is created by `migrations/` at startup.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::{
    page_window, MessageLog, NewRoom, OpenedRoom, RoomStore, StoreError, UserDirectory,
};
use crate::shared::chat::{
    ChatMessage, Membership, MessageId, MessageType, Role, Room, RoomId, UserId, UserType,
    WireMessage, DEFAULT_ROOM_TITLE,
};

const ROOM_COLUMNS: &str = "r.id, r.title, r.help_checked, r.created_at, r.updated_at";

/// sqlx-backed implementation of every store trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_pairing(
        &self,
        student_id: UserId,
        teacher_id: UserId,
    ) -> Result<Option<(Room, Membership)>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {ROOM_COLUMNS}, p.student_id, p.teacher_id
            FROM participants p
            JOIN rooms r ON r.id = p.room_id
            WHERE p.student_id = $1 AND p.teacher_id = $2
            "#
        ))
        .bind(student_id)
        .bind(teacher_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| (room_from_row(&r), membership_from_row(&r))))
    }
}

fn room_from_row(row: &PgRow) -> Room {
    Room {
        id: row.get("id"),
        title: row.get("title"),
        help_checked: row.get("help_checked"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn membership_from_row(row: &PgRow) -> Membership {
    Membership {
        room_id: row.get("id"),
        student_id: row.get("student_id"),
        teacher_id: row.get("teacher_id"),
    }
}

fn message_from_row(row: &PgRow) -> Result<ChatMessage, StoreError> {
    let wire = WireMessage {
        id: row.get("id"),
        room_id: row.get("room_id"),
        title: row.get("title"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        message_type: MessageType::parse(row.get::<String, _>("message_type").as_str())?,
        user_type: UserType::parse(row.get::<String, _>("user_type").as_str())?,
        filename: row.get("filename"),
        timestamp: row.get("sent_at"),
    };
    Ok(ChatMessage::try_from(wire)?)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl RoomStore for PgStore {
    async fn room_exists(&self, room_id: RoomId) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM rooms WHERE id = $1)")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Room, StoreError> {
        let row = sqlx::query(&format!("SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.id = $1"))
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| room_from_row(&r))
            .ok_or_else(|| StoreError::not_found("room", room_id))
    }

    async fn get_membership(&self, room_id: RoomId) -> Result<Membership, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT room_id AS id, student_id, teacher_id
            FROM participants
            WHERE room_id = $1
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| membership_from_row(&r))
            .ok_or_else(|| StoreError::not_found("membership", room_id))
    }

    async fn toggle_help_checked(&self, room_id: RoomId) -> Result<Room, StoreError> {
        // Single-statement flip; row locking serializes concurrent toggles
        let row = sqlx::query(
            r#"
            UPDATE rooms AS r
            SET help_checked = NOT r.help_checked, updated_at = NOW()
            WHERE r.id = $1
            RETURNING r.id, r.title, r.help_checked, r.created_at, r.updated_at
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| room_from_row(&r))
            .ok_or_else(|| StoreError::not_found("room", room_id))
    }

    async fn open_room(&self, new_room: NewRoom) -> Result<OpenedRoom, StoreError> {
        if let Some((room, membership)) =
            self.find_pairing(new_room.student_id, new_room.teacher_id).await?
        {
            return Ok(OpenedRoom { room, membership, created: false });
        }

        let title = new_room
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ROOM_TITLE.to_string());

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO rooms (title, help_checked, created_at, updated_at)
            VALUES ($1, FALSE, NOW(), NOW())
            RETURNING id, title, help_checked, created_at, updated_at
            "#,
        )
        .bind(&title)
        .fetch_one(&mut *tx)
        .await?;
        let room = room_from_row(&row);

        let inserted = sqlx::query(
            r#"
            INSERT INTO participants (room_id, student_id, teacher_id)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(room.id)
        .bind(new_room.student_id)
        .bind(new_room.teacher_id)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                let membership = Membership {
                    room_id: room.id,
                    student_id: new_room.student_id,
                    teacher_id: new_room.teacher_id,
                };
                Ok(OpenedRoom { room, membership, created: true })
            }
            Err(e) if is_unique_violation(&e) => {
                // Lost a race with another open for the same pairing
                tx.rollback().await?;
                let (room, membership) = self
                    .find_pairing(new_room.student_id, new_room.teacher_id)
                    .await?
                    .ok_or_else(|| StoreError::Conflict {
                        message: "pairing created concurrently but not visible".to_string(),
                    })?;
                Ok(OpenedRoom { room, membership, created: false })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("room", room_id));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageLog for PgStore {
    async fn append_message(&self, message: &ChatMessage) -> Result<MessageId, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages
                (id, room_id, sender_id, title, content, message_type, user_type, filename, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(message.id)
        .bind(message.room_id)
        .bind(message.sender_id)
        .bind(&message.title)
        .bind(message.content())
        .bind(message.message_type().as_str())
        .bind(message.user_type.as_str())
        .bind(message.filename())
        .bind(message.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(message.id)
    }

    async fn find_messages(
        &self,
        room_id: RoomId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let (limit, offset) = page_window(page, page_size);

        let rows = sqlx::query(
            r#"
            SELECT id, room_id, sender_id, title, content, message_type, user_type, filename, sent_at
            FROM chat_messages
            WHERE room_id = $1
            ORDER BY sent_at DESC, seq DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(room_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn count_messages(&self, room_id: RoomId) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn get_user_role(&self, user_id: UserId) -> Result<Option<Role>, StoreError> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role.as_deref().and_then(Role::parse))
    }
}
