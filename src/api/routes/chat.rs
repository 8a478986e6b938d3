//! Chat Routes
//!
//! - GET /api/chat-rooms/ - Rooms the caller takes part in
//! - GET /api/chat-rooms/:id/
//! - GET /api/chat-rooms/:id/messages/
//! - POST /api/chat-rooms/:id/send_message/
//!
//! Posted messages are also pushed to the room's WebSocket topic.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{message_view, room_view, user_name, views};
use crate::api::dto::{ChatRoomView, MessageView, SendMessageRequest};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::domain::{ChatRoom, User};
use crate::websocket::WsEvent;

fn participant_room(state: &AppState, user: &User, id: Uuid) -> ApiResult<ChatRoom> {
    let room = state.db.get_chat_room(id)?;
    if !room.is_participant(user.id) {
        return Err(ApiError::forbidden("You are not part of this chat room"));
    }
    Ok(room)
}

/// GET /api/chat-rooms/
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<ChatRoomView>>> {
    let rooms = state.db.list_chat_rooms_for_user(user.id)?;
    Ok(Json(views(&state.db, rooms, room_view)?))
}

/// GET /api/chat-rooms/:id/
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ChatRoomView>> {
    let room = participant_room(&state, &user, id)?;
    Ok(Json(room_view(&state.db, room)?))
}

/// GET /api/chat-rooms/:id/messages/
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let room = participant_room(&state, &user, id)?;
    let messages = state.db.list_messages(room.id)?;

    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        let sender_name = user_name(&state.db, message.sender_id)?;
        out.push(MessageView {
            message,
            sender_name,
        });
    }
    Ok(Json(out))
}

/// POST /api/chat-rooms/:id/send_message/
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageView>)> {
    let content = req.content.unwrap_or_default();
    let view = post_message(&state, id, &user, &content)?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Store a message from `sender` and push it to the room's subscribers
///
/// Shared by the REST endpoint and the chat socket.
pub(crate) fn post_message(
    state: &AppState,
    room_id: Uuid,
    sender: &User,
    content: &str,
) -> ApiResult<MessageView> {
    let room = participant_room(state, sender, room_id)?;
    if !room.is_active {
        return Err(ApiError::validation("This chat room is closed"));
    }
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("Message content is required"));
    }

    let message = state.db.create_message(room.id, sender.id, content)?;
    let view = message_view(message, sender);
    state
        .ws_hub
        .publish(WsEvent::chat_message(&view.message, &view.sender_name));

    tracing::debug!(
        room_id = %room.id,
        sender_id = %sender.id,
        message_id = %view.message.id,
        "Chat message posted"
    );
    Ok(view)
}
