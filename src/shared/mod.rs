//! Shared Module
//!
//! Types shared by every layer of the chat core: the chat data model, the
//! socket frame types, configuration, and the shared error type. All types
//! here are plain data and serialize to the JSON shapes used on sockets,
//! in the durable log, and in REST responses.

/// Chat data model and socket frames
pub mod chat;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use chat::{ChatMessage, ClientFrame, MessageBody, Role, Room, RoomId, UserId, UserType};
pub use config::{ChatConfig, ChatConfigBuilder, ConfigError};
pub use error::SharedError;
