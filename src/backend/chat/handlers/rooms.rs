/**
 * Room Handlers
 *
 * REST endpoints around the chat socket:
 *
 * - `POST /rooms` - open the room of a student/teacher pairing
 * - `GET /rooms/{room_id}` - room, membership and message count
 * - `DELETE /rooms/{room_id}` - delete a room and close its sockets
 * - `POST /rooms/{room_id}/help` - toggle help mode
 * - `GET /rooms/{room_id}/messages` - paged history, newest first
 * - `GET /health` - liveness and local connection count
 *
 * Mutations require a bearer token for one of the room's members when a
 * JWT secret is configured.
 */

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::backend::error::BackendResult;
use crate::backend::middleware::BearerToken;
use crate::backend::server::state::AppState;
use crate::backend::store::{NewRoom, MAX_PAGE_SIZE};
use crate::shared::chat::{ChatMessage, Membership, Room, RoomId, UserId};

/// Default page size of the history endpoint
pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub student_id: UserId,
    pub teacher_id: UserId,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomResponse {
    pub room: Room,
    pub membership: Membership,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomDetails {
    pub room: Room,
    pub membership: Membership,
    pub message_count: i64,
    /// Users connected to this replica
    pub connected_users: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct HelpRequest {
    pub user_id: UserId,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

/// `POST /rooms`
///
/// Returns `201 Created` for a new room and `200 OK` when the pairing
/// already had one.
pub async fn create_room(
    State(state): State<AppState>,
    token: BearerToken,
    Json(request): Json<CreateRoomRequest>,
) -> BackendResult<impl IntoResponse> {
    state
        .auth
        .authorize_any(&[request.student_id, request.teacher_id], token.as_deref())?;

    let opened = state
        .rooms
        .open_room(NewRoom {
            title: request.title,
            student_id: request.student_id,
            teacher_id: request.teacher_id,
        })
        .await?;

    let status = if opened.created {
        tracing::info!(
            "[Server] Created room {} for student {} and teacher {}",
            opened.room.id,
            request.student_id,
            request.teacher_id
        );
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(RoomResponse {
            room: opened.room,
            membership: opened.membership,
        }),
    ))
}

/// `GET /rooms/{room_id}`
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> BackendResult<Json<RoomDetails>> {
    let room = state.rooms.get_room(room_id).await?;
    let membership = state.rooms.get_membership(room_id).await?;
    let message_count = state.messages.count_messages(room_id).await?;

    Ok(Json(RoomDetails {
        room,
        membership,
        message_count,
        connected_users: state.registry.room_members(room_id),
    }))
}

/// `DELETE /rooms/{room_id}`
///
/// History is kept; sockets of the room on this replica are closed.
pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    token: BearerToken,
) -> BackendResult<StatusCode> {
    let membership = state.rooms.get_membership(room_id).await?;
    state
        .auth
        .authorize_any(&[membership.student_id, membership.teacher_id], token.as_deref())?;

    state.rooms.delete_room(room_id).await?;
    let closed = state.registry.close_room(room_id);
    state.chat.forget_room(room_id);

    tracing::info!("[Server] Deleted room {} ({} local sessions closed)", room_id, closed);
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /rooms/{room_id}/help`
///
/// Flips the room between AI and human mode and returns the updated room.
pub async fn toggle_help(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    token: BearerToken,
    Json(request): Json<HelpRequest>,
) -> BackendResult<Json<Room>> {
    state.auth.authorize(request.user_id, token.as_deref())?;
    let room = state.chat.toggle_help(room_id, request.user_id).await?;
    Ok(Json(room))
}

/// `GET /rooms/{room_id}/messages?page=&page_size=`
pub async fn list_messages(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Query(query): Query<HistoryQuery>,
) -> BackendResult<Json<HistoryPage>> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    // Unknown rooms are a 404 rather than an empty page
    state.rooms.get_room(room_id).await?;

    let messages = state.messages.find_messages(room_id, page, page_size).await?;
    let total = state.messages.count_messages(room_id).await?;
    let has_more = i64::from(page) * i64::from(page_size) < total;

    Ok(Json(HistoryPage {
        messages,
        total,
        page,
        page_size,
        has_more,
    }))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.registry.connection_count(),
    }))
}
