/**
 * Backend Error Types
 *
 * This module defines the error taxonomy of the chat core. The same error
 * type is surfaced through three channels:
 *
 * - HTTP handlers, via `status_code()` and `IntoResponse`
 * - socket close frames, via `close_code()`
 * - error frames pushed to a single client, via `message()`
 *
 * # Error Categories
 *
 * ## Connection-time validation
 *
 * `RoomNotFound`, `UserRoleNotFound` and `NotRoomMember` close the socket
 * with code 4004 and are never retried. `Unauthorized` closes it with the policy-violation
 * code.
 *
 * ## Delivery
 *
 * `DeliveryUnavailable` means the durable log refused an append. It is
 * always surfaced to the caller and never swallowed.
 *
 * ## Soft rejects
 *
 * `PermissionDenied` (a teacher speaking in AI mode) and `UpstreamAi` are
 * recovered locally; they exist so the recovery sites can log them with a
 * uniform shape.
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::fanout::LogError;
use crate::backend::store::StoreError;
use crate::shared::chat::{RoomId, UserId};
use crate::shared::SharedError;

/// Socket close code for room or role lookup failures
pub const CLOSE_LOOKUP_FAILED: u16 = 4004;

/// Socket close code for authentication failures (RFC 6455 policy violation)
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Backend-specific error types
#[derive(Debug, Error)]
pub enum BackendError {
    /// Handler error (e.g., invalid request body)
    #[error("Handler error: {message}")]
    HandlerError {
        /// HTTP status code for this error
        status: StatusCode,
        /// Human-readable error message
        message: String,
    },

    /// The room does not exist in the room store
    #[error("Room {room_id} not found")]
    RoomNotFound { room_id: RoomId },

    /// The user directory has no role for this user
    #[error("Role for user {user_id} not found")]
    UserRoleNotFound { user_id: UserId },

    /// The user has a role but is not a participant of the room
    #[error("User {user_id} is not a member of room {room_id}")]
    NotRoomMember { room_id: RoomId, user_id: UserId },

    /// Missing or invalid credentials
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// The caller is not allowed to perform the action
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// The durable log could not accept the event
    #[error("Delivery unavailable: {0}")]
    DeliveryUnavailable(#[from] LogError),

    /// The text generation service failed
    #[error("AI upstream failure: {message}")]
    UpstreamAi { message: String },

    /// Room or message store failure
    #[error(transparent)]
    Store(StoreError),

    /// Shared error (validation, serialization)
    #[error(transparent)]
    SharedError(#[from] SharedError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BackendError {
    /// Create a new handler error with a status code
    pub fn handler(status: StatusCode, message: impl Into<String>) -> Self {
        Self::HandlerError {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn upstream_ai(message: impl Into<String>) -> Self {
        Self::UpstreamAi {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    ///
    /// # Status Code Mapping
    ///
    /// - `HandlerError` - Uses the status code from the error
    /// - `RoomNotFound`, `UserRoleNotFound`, store `NotFound` - 404
    /// - `Unauthorized` - 401
    /// - `PermissionDenied` - 403
    /// - `DeliveryUnavailable` - 503
    /// - `UpstreamAi` - 502
    /// - `SharedError::ValidationError` - 400
    /// - everything else - 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::HandlerError { status, .. } => *status,
            Self::RoomNotFound { .. } | Self::UserRoleNotFound { .. } => StatusCode::NOT_FOUND,
            Self::NotRoomMember { .. } => StatusCode::FORBIDDEN,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            Self::DeliveryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamAi { .. } => StatusCode::BAD_GATEWAY,
            Self::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SharedError(SharedError::ValidationError { .. }) => StatusCode::BAD_REQUEST,
            Self::SharedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        match self {
            Self::HandlerError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Close code for a socket rejected with this error
    ///
    /// Returns `None` for errors that do not terminate a connection.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::RoomNotFound { .. }
            | Self::UserRoleNotFound { .. }
            | Self::NotRoomMember { .. } => Some(CLOSE_LOOKUP_FAILED),
            Self::Unauthorized { .. } => Some(CLOSE_POLICY_VIOLATION),
            _ => None,
        }
    }
}

impl From<StoreError> for BackendError {
    /// Room and membership lookups that miss become `RoomNotFound`
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity: "room" | "membership", id } => {
                Self::RoomNotFound { room_id: id }
            }
            other => Self::Store(other),
        }
    }
}
