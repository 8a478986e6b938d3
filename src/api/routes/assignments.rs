//! Assignment Routes
//!
//! - GET /api/assignments/ - The caller's hospital assignments as a donor

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::domain::Assignment;

/// GET /api/assignments/
pub async fn list_assignments(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<Assignment>>> {
    Ok(Json(state.db.list_assignments_for_donor(user.id)?))
}
