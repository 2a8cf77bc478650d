//! Chat Backend Module
//!
//! The chat core proper: help-mode routing, publishing, the AI bridge and
//! the HTTP/socket handlers in front of them.
//!
//! # Architecture
//!
//! - **`routing`** - admission per help mode, help toggles
//! - **`publisher`** - persist, then append to the fan-out log
//! - **`ai_bridge`** - streamed AI answers split into fragments
//! - **`handlers`** - socket and REST endpoints
//!
//! # Message Flow
//!
//! ```text
//! socket frame ─► ChatService::handle_frame ─► ChatPublisher::publish
//!                        │                        ├─► MessageLog
//!                        │                        └─► DurableLog
//!                        └─► AiBridge::respond (student, AI mode)
//!
//! DurableLog ─► FanoutConsumer ─► ConnectionRegistry ─► sockets
//! ```

/// AI response bridge
pub mod ai_bridge;

/// Socket and REST handlers
pub mod handlers;

/// Persist-then-fan-out publishing
pub mod publisher;

/// Help-mode routing
pub mod routing;

pub use ai_bridge::{AiBridge, Chunker, GenaiTextGenerator, Prompt, TextGenerator, TextStream};
pub use publisher::ChatPublisher;
pub use routing::{Admission, ChatService};
