//! Real-time Delivery Module
//!
//! Tracks the sockets connected to this process and pushes chat events to
//! them. Events reach the registry only through the fan-out consumer, so
//! every replica delivers the same stream to its own sockets.
//!
//! # Module Structure
//!
//! ```text
//! realtime/
//! ├── mod.rs      - Module exports and documentation
//! └── registry.rs - ConnectionRegistry and session handles
//! ```

/// Room/user to socket registry
pub mod registry;

pub use registry::{
    ConnectionRegistry, Outbox, OutboundFrame, SessionId, SessionTicket, OUTBOX_CAPACITY,
};
