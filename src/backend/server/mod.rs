//! Server Module
//!
//! Construction and lifecycle of the chat core.
//!
//! - **`state`** - `AppState` and `FromRef` implementations
//! - **`config`** - connecting the database and the durable log
//! - **`init`** - service graph wiring, consumer start and shutdown
//!
//! # Module Structure
//!
//! ```text
//! server/
//! ├── mod.rs    - Module exports and documentation
//! ├── state.rs  - AppState and FromRef implementations
//! ├── config.rs - Backend service loading
//! └── init.rs   - ChatRuntime creation and shutdown
//! ```
//!
//! There is no global state: everything a handler touches is reachable from
//! the `AppState` built by [`init::start`].

/// Application state management
pub mod state;

/// Backend service loading
pub mod config;

/// Server initialization
pub mod init;

pub use config::StartupError;
pub use init::{init, start, Backends, ChatRuntime};
pub use state::AppState;
