//! Authentication Module
//!
//! Optional token checks for sockets and REST mutations. When no JWT secret
//! is configured every request is trusted; this matches deployments where
//! an upstream gateway authenticates users.
//!
//! # Module Structure
//!
//! ```text
//! auth/
//! ├── mod.rs      - Authenticator
//! └── sessions.rs - JWT token creation and validation
//! ```
//!
//! # Rules
//!
//! - Socket: the `token` query parameter must decode to the path `user_id`,
//!   otherwise the socket is closed with 1008.
//! - REST: the bearer token must decode to the acting `user_id`, otherwise
//!   the request is rejected with 401.

/// JWT token generation and validation
pub mod sessions;

use crate::backend::error::{BackendError, BackendResult};
use crate::shared::chat::UserId;

pub use sessions::{create_token, get_user_id_from_token, verify_token, Claims};

/// Verifies that a request acts as the user it claims to be
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    secret: Option<String>,
}

impl Authenticator {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Authenticator that accepts every request
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    fn token_user(secret: &str, token: Option<&str>) -> BackendResult<UserId> {
        let token = token.ok_or_else(|| BackendError::unauthorized("missing token"))?;
        get_user_id_from_token(secret, token).map_err(|e| {
            tracing::warn!("[Auth] Rejected token: {}", e);
            BackendError::unauthorized("invalid token")
        })
    }

    /// Check that `token` identifies `user_id`
    pub fn authorize(&self, user_id: UserId, token: Option<&str>) -> BackendResult<()> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };

        let token_user = Self::token_user(secret, token)?;
        if token_user != user_id {
            tracing::warn!("[Auth] Token for user {} used as user {}", token_user, user_id);
            return Err(BackendError::unauthorized("token does not match user"));
        }
        Ok(())
    }

    /// Check that `token` identifies one of `users`
    pub fn authorize_any(&self, users: &[UserId], token: Option<&str>) -> BackendResult<()> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };

        let token_user = Self::token_user(secret, token)?;
        if !users.contains(&token_user) {
            return Err(BackendError::permission_denied(format!(
                "user {token_user} may not modify this room"
            )));
        }
        Ok(())
    }
}
