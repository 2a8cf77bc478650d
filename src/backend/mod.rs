//! Backend Module
//!
//! Server-side code of the chat core: an Axum HTTP/WebSocket server in
//! front of a help-mode router, a durable fan-out pipeline and pluggable
//! stores.
//!
//! # Architecture
//!
//! - **`server`** - service graph construction, lifecycle, `AppState`
//! - **`routes`** - HTTP route configuration and router assembly
//! - **`chat`** - routing, publishing, AI bridge, handlers
//! - **`fanout`** - durable log, producer and consumer
//! - **`realtime`** - registry of sockets connected to this process
//! - **`store`** - room, message and user store interfaces
//! - **`auth`** - optional JWT checks
//! - **`middleware`** - request extraction helpers
//! - **`error`** - backend error types
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs       - Module exports and documentation
//! ├── main.rs      - Binary entry point
//! ├── server/      - Initialization and state
//! ├── routes/      - Route configuration
//! ├── chat/        - Routing, AI bridge, handlers
//! ├── fanout/      - Durable log pipeline
//! ├── realtime/    - Connection registry
//! ├── store/       - Persistence interfaces
//! ├── auth/        - Token checks
//! ├── middleware/  - Request helpers
//! └── error/       - Error types
//! ```
//!
//! # Thread Safety
//!
//! - Stores, logs and generators are `Arc<dyn Trait + Send + Sync>`
//! - The registry uses a `std::sync::RwLock`; no lock is held across an
//!   `.await`
//! - Each socket has one reader task and one writer task joined by an
//!   `mpsc` channel
//!
//! # Error Handling
//!
//! Every layer has its own `thiserror` enum; `BackendError` aggregates them
//! and maps to HTTP status codes and socket close codes.

/// Server setup and lifecycle
pub mod server;

/// Route configuration
pub mod routes;

/// Chat routing, AI bridge and handlers
pub mod chat;

/// Durable fan-out pipeline
pub mod fanout;

/// Connection registry
pub mod realtime;

/// Persistence interfaces
pub mod store;

/// Backend error types
pub mod error;

/// Token checks
pub mod auth;

/// Request helpers
pub mod middleware;

/// Re-export commonly used types
pub use chat::{Admission, ChatService};
pub use error::{BackendError, BackendResult};
pub use realtime::ConnectionRegistry;
pub use server::{init, AppState, ChatRuntime};
