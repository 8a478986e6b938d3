//! Hospital Routes
//!
//! - GET /api/hospitals/ - List hospitals
//! - POST /api/hospitals/ - Create a hospital (open)
//! - GET /api/hospitals/nearby_hospitals/?lat&lng&max_distance
//! - GET /api/hospitals/:id/
//! - PUT|PATCH|DELETE /api/hospitals/:id/ - Staff only
//! - GET /api/hospital-coordinates/ - Map pins (open)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::{
    required_text, HospitalCoordinates, HospitalInput, HospitalPatch, NearbyQuery, WithDistance,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::domain::{Hospital, User};
use crate::geo::Coordinates;
use crate::storage::NewHospital;

fn ensure_staff(user: &User) -> ApiResult<()> {
    if user.is_staff {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only staff can modify hospitals"))
    }
}

/// GET /api/hospitals/
pub async fn list_hospitals(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<Hospital>>> {
    Ok(Json(state.db.list_hospitals()?))
}

/// POST /api/hospitals/
pub async fn create_hospital(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HospitalInput>,
) -> ApiResult<(StatusCode, Json<Hospital>)> {
    let new = NewHospital {
        name: required_text("name", req.name)?,
        address: req.address,
        phone_number: req.phone_number,
        email: req.email.filter(|e| !e.trim().is_empty()),
        location: Coordinates::parse(req.location_lat, req.location_long)?,
    };
    let hospital = state.db.create_hospital(&new)?;
    Ok((StatusCode::CREATED, Json(hospital)))
}

/// GET /api/hospitals/nearby_hospitals/
pub async fn nearby_hospitals(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Query(query): Query<NearbyQuery>,
) -> ApiResult<Json<Vec<WithDistance<Hospital>>>> {
    let origin = query.origin()?;
    let max_km = query.max_distance(state.matcher.config().nearby_radius_km)?;
    let hospitals = state.matcher.nearby_hospitals(origin, max_km)?;
    Ok(Json(hospitals.into_iter().map(WithDistance::from).collect()))
}

/// GET /api/hospitals/:id/
pub async fn get_hospital(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Hospital>> {
    Ok(Json(state.db.get_hospital(id)?))
}

/// PUT|PATCH /api/hospitals/:id/
pub async fn update_hospital(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<HospitalPatch>,
) -> ApiResult<Json<Hospital>> {
    ensure_staff(&user)?;
    let mut hospital = state.db.get_hospital(id)?;
    patch.apply(&mut hospital)?;
    state.db.update_hospital(&hospital)?;
    tracing::info!(hospital_id = %id, updated_by = %user.id, "Hospital updated");
    Ok(Json(hospital))
}

/// DELETE /api/hospitals/:id/
pub async fn delete_hospital(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    ensure_staff(&user)?;
    state.db.delete_hospital(id)?;
    tracing::info!(hospital_id = %id, deleted_by = %user.id, "Hospital deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/hospital-coordinates/
pub async fn hospital_coordinates(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<HospitalCoordinates>>> {
    let hospitals = state.db.list_hospitals()?;
    Ok(Json(hospitals.into_iter().map(HospitalCoordinates::from).collect()))
}
