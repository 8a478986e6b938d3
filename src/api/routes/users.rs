//! User Routes
//!
//! - GET /api/users/ - Staff see every account, others only themselves
//! - GET /api/users/profile/ - The caller's own account
//! - GET /api/users/nearby_donors/?lat&lng&blood_group&max_distance
//! - GET|PUT|PATCH /api/users/:id/
//! - PUT|PATCH /api/users/:id/update_profile/
//! - POST /api/users/:id/change_password/

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::{
    ChangePasswordRequest, MessageResponse, NearbyQuery, UserUpdate, WithDistance,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::auth::validate_password;
use crate::domain::User;

/// Only the account owner and staff may read or change an account
fn ensure_self_or_staff(current: &User, id: Uuid) -> ApiResult<()> {
    if current.id == id || current.is_staff {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "You do not have permission to access this account",
        ))
    }
}

/// GET /api/users/
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<User>>> {
    if user.is_staff {
        Ok(Json(state.db.list_users()?))
    } else {
        Ok(Json(vec![user]))
    }
}

/// GET /api/users/profile/
pub async fn profile(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// GET /api/users/nearby_donors/
pub async fn nearby_donors(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<NearbyQuery>,
) -> ApiResult<Json<Vec<WithDistance<User>>>> {
    let origin = query.origin()?;
    let max_km = query.max_distance(state.matcher.config().nearby_radius_km)?;
    let blood_group = query.blood_group()?;

    let donors = state
        .matcher
        .nearby_donors(origin, blood_group, max_km, Some(user.id))?;

    tracing::debug!(
        user_id = %user.id,
        found = donors.len(),
        max_km,
        "Nearby donor search"
    );

    Ok(Json(donors.into_iter().map(WithDistance::from).collect()))
}

/// GET /api/users/:id/
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(current): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    ensure_self_or_staff(&current, id)?;
    Ok(Json(state.db.get_user(id)?))
}

/// PUT|PATCH /api/users/:id/ and /api/users/:id/update_profile/
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(current): CurrentUser,
    Path(id): Path<Uuid>,
    Json(update): Json<UserUpdate>,
) -> ApiResult<Json<User>> {
    ensure_self_or_staff(&current, id)?;
    let mut user = state.db.get_user(id)?;

    if let Some(email) = update.email.as_deref() {
        if let Some(other) = state.db.get_user_by_email(email.trim())? {
            if other.id != user.id {
                return Err(ApiError::validation("A user with that email already exists."));
            }
        }
    }

    update.apply(&mut user)?;
    state.db.update_user(&user)?;

    tracing::info!(user_id = %user.id, updated_by = %current.id, "Profile updated");
    Ok(Json(user))
}

/// POST /api/users/:id/change_password/
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    CurrentUser(current): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if current.id != id {
        return Err(ApiError::forbidden("You can only change your own password"));
    }
    if !state
        .auth
        .passwords
        .verify(&req.old_password, &current.password_hash)?
    {
        return Err(ApiError::validation("Old password is incorrect"));
    }
    validate_password(&req.new_password).map_err(ApiError::Validation)?;

    let hash = state.auth.passwords.hash(&req.new_password)?;
    state.db.set_user_password(current.id, &hash)?;
    tracing::info!(user_id = %current.id, "Password changed");

    Ok(Json(MessageResponse::new("Password changed successfully")))
}
