//! Chat Module
//!
//! Data structures of the chat core shared by every backend layer:
//!
//! - `Room`, `Membership`, `Role`, `HelpMode` - room state and routing mode
//! - `ChatMessage`, `MessageBody`, `UserType` - persisted/broadcast messages
//! - `ClientFrame`, `ErrorFrame` - socket frames

pub mod frame;
pub mod message;
pub mod room;

pub use frame::{ClientFrame, ErrorFrame};
pub use message::{ChatMessage, MessageBody, MessageId, MessageType, UserType, WireMessage};
pub use room::{
    HelpMode, Membership, Role, Room, RoomId, SystemBanner, UserId, AI_SENDER_ID,
    DEFAULT_ROOM_TITLE, SYSTEM_SENDER_ID,
};
