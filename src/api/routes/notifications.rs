//! Notification Routes
//!
//! - GET /api/notifications/ - Newest first
//! - GET /api/notifications/unread_count/
//! - POST /api/notifications/mark_all_read/
//! - GET /api/notifications/:id/
//! - POST /api/notifications/:id/mark_read/

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::{MarkAllReadResponse, MessageResponse, UnreadCountResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::domain::{Notification, User};

/// Another user's notification is reported as missing
fn owned_notification(state: &AppState, user: &User, id: Uuid) -> ApiResult<Notification> {
    let notification = state.db.get_notification(id)?;
    if notification.user_id != user.id {
        return Err(ApiError::NotFound(format!("Notification not found: {id}")));
    }
    Ok(notification)
}

/// GET /api/notifications/
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(state.db.list_notifications_for_user(user.id)?))
}

/// GET /api/notifications/:id/
pub async fn get_notification(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    Ok(Json(owned_notification(&state, &user, id)?))
}

/// POST /api/notifications/:id/mark_read/
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    owned_notification(&state, &user, id)?;
    state.db.mark_notification_read(id)?;
    Ok(Json(MessageResponse::new("Notification marked as read")))
}

/// POST /api/notifications/mark_all_read/
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<MarkAllReadResponse>> {
    let updated = state.db.mark_all_notifications_read(user.id)?;
    Ok(Json(MarkAllReadResponse {
        message: "All notifications marked as read".to_string(),
        updated,
    }))
}

/// GET /api/notifications/unread_count/
pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<UnreadCountResponse>> {
    Ok(Json(UnreadCountResponse {
        unread_count: state.db.unread_notification_count(user.id)?,
    }))
}
