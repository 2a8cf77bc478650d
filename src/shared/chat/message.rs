//! Chat Message Data Structure
//!
//! A chat message is a tagged variant over text, image, and system bodies.
//! On the wire (socket frames, fan-out log entries, history responses) it
//! is flattened into the JSON shape clients already understand:
//!
//! ```json
//! {
//!   "id": "…", "room_id": 1, "title": "…", "sender_id": 42,
//!   "content": "…", "message_type": "text", "user_type": "student",
//!   "filename": null, "timestamp": "2024-01-01T00:00:00Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::room::{Role, Room, RoomId, SystemBanner, UserId, AI_SENDER_ID, SYSTEM_SENDER_ID};
use crate::shared::error::SharedError;

/// Unique message id
pub type MessageId = Uuid;

/// Who produced a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Student,
    Teacher,
    Ai,
    System,
}

impl UserType {
    /// Convert to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Student => "student",
            UserType::Teacher => "teacher",
            UserType::Ai => "ai",
            UserType::System => "system",
        }
    }

    /// Parse from string (database)
    pub fn parse(value: &str) -> Result<Self, SharedError> {
        match value {
            "student" => Ok(UserType::Student),
            "teacher" => Ok(UserType::Teacher),
            "ai" => Ok(UserType::Ai),
            "system" => Ok(UserType::System),
            other => Err(SharedError::validation("user_type", format!("unknown user type '{other}'"))),
        }
    }
}

impl From<Role> for UserType {
    fn from(role: Role) -> Self {
        match role {
            Role::Student => UserType::Student,
            Role::Teacher => UserType::Teacher,
        }
    }
}

/// Wire-level content kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
        }
    }

    pub fn parse(value: &str) -> Result<Self, SharedError> {
        match value {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            other => Err(SharedError::validation("message_type", format!("unknown message type '{other}'"))),
        }
    }
}

/// Content of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Plain text from a participant or the AI
    Text(String),
    /// Image reference; `url` is the uploaded object location
    Image { url: String, filename: Option<String> },
    /// Banner emitted by the server on mode transitions
    System(String),
}

impl MessageBody {
    pub fn content(&self) -> &str {
        match self {
            MessageBody::Text(text) | MessageBody::System(text) => text,
            MessageBody::Image { url, .. } => url,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Image { .. } => MessageType::Image,
            MessageBody::Text(_) | MessageBody::System(_) => MessageType::Text,
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            MessageBody::Image { filename, .. } => filename.as_deref(),
            _ => None,
        }
    }
}

/// A persisted, broadcastable chat message
///
/// Messages are immutable once created. The `title` is the room title at
/// send time so history stays readable after a rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireMessage", try_from = "WireMessage")]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub title: String,
    pub user_type: UserType,
    pub body: MessageBody,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn build(room: &Room, sender_id: UserId, user_type: UserType, body: MessageBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id: room.id,
            sender_id,
            title: room.title.clone(),
            user_type,
            body,
            timestamp: Utc::now(),
        }
    }

    /// Message authored by a human participant
    pub fn from_participant(room: &Room, sender_id: UserId, role: Role, body: MessageBody) -> Self {
        Self::build(room, sender_id, role.into(), body)
    }

    /// One fragment of a streamed AI answer
    pub fn ai_fragment(room: &Room, content: impl Into<String>) -> Self {
        Self::build(room, AI_SENDER_ID, UserType::Ai, MessageBody::Text(content.into()))
    }

    /// Help mode transition banner
    pub fn system(room: &Room, banner: SystemBanner) -> Self {
        Self::build(
            room,
            SYSTEM_SENDER_ID,
            UserType::System,
            MessageBody::System(banner.text().to_string()),
        )
    }

    pub fn content(&self) -> &str {
        self.body.content()
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    pub fn filename(&self) -> Option<&str> {
        self.body.filename()
    }
}

/// Flat JSON representation of a [`ChatMessage`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub title: String,
    pub sender_id: UserId,
    pub content: String,
    pub message_type: MessageType,
    pub user_type: UserType,
    #[serde(default)]
    pub filename: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<ChatMessage> for WireMessage {
    fn from(message: ChatMessage) -> Self {
        let message_type = message.body.message_type();
        let (content, filename) = match message.body {
            MessageBody::Text(text) | MessageBody::System(text) => (text, None),
            MessageBody::Image { url, filename } => (url, filename),
        };
        Self {
            id: message.id,
            room_id: message.room_id,
            title: message.title,
            sender_id: message.sender_id,
            content,
            message_type,
            user_type: message.user_type,
            filename,
            timestamp: message.timestamp,
        }
    }
}

impl TryFrom<WireMessage> for ChatMessage {
    type Error = SharedError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let body = match (wire.user_type, wire.message_type) {
            (UserType::System, MessageType::Text) => MessageBody::System(wire.content),
            (UserType::System, MessageType::Image) => {
                return Err(SharedError::validation("message_type", "system messages must be text"));
            }
            (_, MessageType::Text) => MessageBody::Text(wire.content),
            (_, MessageType::Image) => MessageBody::Image {
                url: wire.content,
                filename: wire.filename,
            },
        };

        Ok(Self {
            id: wire.id,
            room_id: wire.room_id,
            sender_id: wire.sender_id,
            title: wire.title,
            user_type: wire.user_type,
            body,
            timestamp: wire.timestamp,
        })
    }
}
