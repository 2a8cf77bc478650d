//! Middleware Module
//!
//! Request processing shared by the REST handlers.
//!
//! - **`auth`** - bearer token extraction

pub mod auth;

pub use auth::{bearer_token, BearerToken};
