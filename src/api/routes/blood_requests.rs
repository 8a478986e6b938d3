//! Blood Request Routes
//!
//! - GET /api/blood-requests/ - Staff: all; others: own and donated-to
//! - POST /api/blood-requests/ - Create; alerts matching donors nearby
//! - GET /api/blood-requests/:id/
//! - POST /api/blood-requests/:id/cancel/ - Owner, while still open
//! - GET /api/blood-requests/:id/find_best_donors/
//! - GET /api/available-blood-requests/ - Requests the caller could answer

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::{request_view, views};
use crate::api::dto::{BloodRequestInput, BloodRequestView, WithDistance};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::domain::{BloodRequest, NotificationType, RequestStatus, User};
use crate::geo::{round_km, Coordinates};
use crate::storage::NewBloodRequest;

/// GET /api/blood-requests/
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<BloodRequestView>>> {
    let requests = if user.is_staff {
        state.db.list_blood_requests()?
    } else {
        visible_requests(&state, &user)?
    };
    Ok(Json(views(&state.db, requests, request_view)?))
}

/// The caller's own requests plus those they offered to donate to
fn visible_requests(state: &AppState, user: &User) -> ApiResult<Vec<BloodRequest>> {
    let mut requests = state.db.list_blood_requests_for_user(user.id)?;
    let mut seen: HashSet<Uuid> = requests.iter().map(|r| r.id).collect();

    for donation in state.db.list_donations_for_donor(user.id)? {
        if seen.insert(donation.blood_request_id) {
            requests.push(state.db.get_blood_request(donation.blood_request_id)?);
        }
    }

    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(requests)
}

/// POST /api/blood-requests/
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<BloodRequestInput>,
) -> ApiResult<(StatusCode, Json<BloodRequestView>)> {
    if req.units_required == 0 {
        return Err(ApiError::validation("units_required must be at least 1"));
    }
    let urgency = req.urgency.trim().to_lowercase();
    if urgency.is_empty() {
        return Err(ApiError::validation("urgency is required"));
    }

    let request = state.db.create_blood_request(&NewBloodRequest {
        patient_id: user.id,
        blood_group: req.blood_group,
        units_required: req.units_required,
        urgency,
        reason: req.reason.filter(|r| !r.trim().is_empty()),
        location: Coordinates::parse(req.location_lat, req.location_long)?,
    })?;

    let notified = notify_nearby_donors(&state, &request)?;
    tracing::info!(
        request_id = %request.id,
        patient_id = %user.id,
        blood_group = %request.blood_group,
        donors_notified = notified,
        "Blood request created"
    );

    Ok((StatusCode::CREATED, Json(request_view(&state.db, request)?)))
}

fn notify_nearby_donors(state: &AppState, request: &BloodRequest) -> ApiResult<usize> {
    let donors = state.matcher.donors_to_notify(request)?;
    for donor in &donors {
        state.notifier.send(
            donor.item.id,
            NotificationType::BloodRequest,
            "Blood Request Nearby",
            format!(
                "A patient nearby needs {} blood. Can you help?",
                request.blood_group
            ),
            Some(request.id),
        )?;
    }
    Ok(donors.len())
}

/// GET /api/blood-requests/:id/
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BloodRequestView>> {
    let request = state.db.get_blood_request(id)?;
    Ok(Json(request_view(&state.db, request)?))
}

/// POST /api/blood-requests/:id/cancel/
pub async fn cancel_request(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BloodRequestView>> {
    let mut request = state.db.get_blood_request(id)?;
    if request.patient_id != user.id {
        return Err(ApiError::forbidden("You can only cancel your own requests"));
    }
    if !request.status.is_open() {
        return Err(ApiError::validation(format!(
            "A {} request cannot be cancelled",
            request.status
        )));
    }

    state.db.set_request_status(id, RequestStatus::Cancelled)?;
    request.status = RequestStatus::Cancelled;
    tracing::info!(request_id = %id, "Blood request cancelled");

    Ok(Json(request_view(&state.db, request)?))
}

/// GET /api/blood-requests/:id/find_best_donors/
pub async fn find_best_donors(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<WithDistance<User>>>> {
    let request = state.db.get_blood_request(id)?;
    if request.patient_id != user.id && !user.is_staff {
        return Err(ApiError::forbidden(
            "Only the requesting patient can search donors",
        ));
    }
    let donors = state.matcher.best_donors(&request)?;
    Ok(Json(donors.into_iter().map(WithDistance::from).collect()))
}

/// GET /api/available-blood-requests/
pub async fn available_requests(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<WithDistance<BloodRequestView>>>> {
    let ranked = state.matcher.available_requests(&user)?;
    let mut out = Vec::with_capacity(ranked.len());
    for entry in ranked {
        out.push(WithDistance {
            item: request_view(&state.db, entry.item)?,
            distance: round_km(entry.distance_km),
        });
    }
    Ok(Json(out))
}
