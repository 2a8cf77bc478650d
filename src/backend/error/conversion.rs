/**
 * Error Conversion
 *
 * Backend errors render as JSON HTTP responses:
 * ```json
 * {
 *   "error": "Room 12 not found",
 *   "status": 404
 * }
 * ```
 */

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::backend::error::types::BackendError;

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!("[Server] Request failed: {}", message);
        } else {
            tracing::debug!("[Server] Request rejected ({}): {}", status, message);
        }

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
