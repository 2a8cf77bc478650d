//! Route Configuration Module
//!
//! Assembles the HTTP routes of the chat core.
//!
//! # Module Structure
//!
//! ```text
//! routes/
//! ├── mod.rs         - Module exports and documentation
//! ├── router.rs      - Router creation and layers
//! └── chat_routes.rs - Socket and REST routes
//! ```

/// Main router creation
pub mod router;

/// Chat routes
pub mod chat_routes;

pub use router::create_router;
