//! Backend Error Module
//!
//! Error types of the chat core and their conversions into HTTP responses
//! and socket close codes.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - Error type definitions and close codes
//! └── conversion.rs - IntoResponse implementation
//! ```

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

// Re-export commonly used types
pub use types::{BackendError, CLOSE_LOOKUP_FAILED, CLOSE_POLICY_VIOLATION};

/// Result alias used across the backend
pub type BackendResult<T> = Result<T, BackendError>;
