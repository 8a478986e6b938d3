//! Donation Routes
//!
//! - GET /api/donations/ - The caller's donations
//! - POST /api/donations/ - Offer to donate for a request
//! - GET|PATCH /api/donations/:id/
//! - POST /api/donations/:id/accept/ - Donor confirms; hospital is chosen,
//!   chat room opened and both sides notified
//! - GET /api/donations/:id/chat_room/
//! - POST /api/complete-donation/:id/ - Staff mark a donation completed

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{donation_view, room_view, views};
use crate::api::dto::{
    AcceptDonationRequest, AcceptDonationResponse, ChatRoomView, DonationInput, DonationPatch,
    DonationView, MessageResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::domain::{
    BloodRequest, Donation, DonationStatus, NotificationType, RequestStatus, User,
};
use crate::geo::Coordinates;

/// GET /api/donations/
pub async fn list_donations(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<DonationView>>> {
    let donations = state.db.list_donations_for_donor(user.id)?;
    Ok(Json(views(&state.db, donations, donation_view)?))
}

/// POST /api/donations/
pub async fn create_donation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<DonationInput>,
) -> ApiResult<(StatusCode, Json<DonationView>)> {
    if !user.is_donor {
        return Err(ApiError::forbidden("Only donors can offer donations"));
    }
    let request = state.db.get_blood_request(req.blood_request)?;
    if request.patient_id == user.id {
        return Err(ApiError::validation(
            "You cannot donate to your own blood request",
        ));
    }
    if matches!(
        request.status,
        RequestStatus::Completed | RequestStatus::Cancelled
    ) {
        return Err(ApiError::validation(
            "This blood request is no longer accepting donations",
        ));
    }
    let already_offered = state
        .db
        .list_donations_for_donor(user.id)?
        .iter()
        .any(|d| d.blood_request_id == request.id && d.status != DonationStatus::Cancelled);
    if already_offered {
        return Err(ApiError::validation(
            "You have already offered to donate for this request",
        ));
    }

    if let (Some(lat), Some(lng)) = (req.location_lat, req.location_long) {
        state
            .db
            .set_user_location(user.id, Coordinates::parse(lat, lng)?)?;
    }

    let donation = state.db.create_donation(user.id, request.id)?;
    state
        .db
        .set_request_status(request.id, RequestStatus::Donating)?;

    tracing::info!(
        donation_id = %donation.id,
        donor_id = %user.id,
        request_id = %request.id,
        "Donation offered"
    );

    Ok((StatusCode::CREATED, Json(donation_view(&state.db, donation)?)))
}

/// Load a donation the caller takes part in, with its request
fn participant_donation(
    state: &AppState,
    user: &User,
    id: Uuid,
) -> ApiResult<(Donation, BloodRequest)> {
    let donation = state.db.get_donation(id)?;
    let request = state.db.get_blood_request(donation.blood_request_id)?;
    if donation.donor_id != user.id && request.patient_id != user.id && !user.is_staff {
        return Err(ApiError::forbidden(
            "You do not have permission to view this donation",
        ));
    }
    Ok((donation, request))
}

/// GET /api/donations/:id/
pub async fn get_donation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DonationView>> {
    let (donation, _) = participant_donation(&state, &user, id)?;
    Ok(Json(donation_view(&state.db, donation)?))
}

/// PATCH /api/donations/:id/
///
/// Donor and patient may schedule or cancel; completion is for staff.
/// Completed and cancelled donations are final.
pub async fn update_donation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<DonationPatch>,
) -> ApiResult<Json<DonationView>> {
    let (donation, request) = participant_donation(&state, &user, id)?;
    let old_status = donation.status;

    let updated = match patch.status {
        status if status == old_status => donation,
        _ if old_status.is_final() => {
            return Err(ApiError::validation(format!(
                "A {old_status} donation cannot be changed"
            )));
        }
        DonationStatus::Completed => {
            if !user.is_staff {
                return Err(ApiError::forbidden(
                    "Only hospital staff can complete donations",
                ));
            }
            finish_donation(&state, donation.id)?.0
        }
        DonationStatus::Pending => {
            return Err(ApiError::validation(
                "A donation cannot be moved back to pending",
            ));
        }
        DonationStatus::Scheduled => {
            let updated = state
                .db
                .transition_donation(id, &[DonationStatus::Pending], DonationStatus::Scheduled)?
                .ok_or_else(|| ApiError::validation("Donation has already been processed"))?;
            let donor = state.db.get_user(updated.donor_id)?;
            state.notifier.send(
                request.patient_id,
                NotificationType::DonationAccepted,
                "Donation Request Accepted! 🎉",
                format!(
                    "Your blood request for {} has been accepted by {}. \
                     You can now chat with them to coordinate the donation.",
                    request.blood_group,
                    donor.full_name()
                ),
                Some(updated.id),
            )?;
            updated
        }
        DonationStatus::Cancelled => withdraw_donation(&state, id)?,
    };

    if updated.status != old_status {
        tracing::info!(
            donation_id = %id,
            from = %old_status,
            to = %updated.status,
            changed_by = %user.id,
            "Donation status changed"
        );
    }
    Ok(Json(donation_view(&state.db, updated)?))
}

/// POST /api/donations/:id/accept/
pub async fn accept_donation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    body: Option<Json<AcceptDonationRequest>>,
) -> ApiResult<Json<AcceptDonationResponse>> {
    let donation = state.db.get_donation(id)?;
    if donation.donor_id != user.id {
        return Err(ApiError::forbidden("You can only accept your own donations"));
    }
    if donation.status != DonationStatus::Pending {
        return Err(ApiError::validation("Donation has already been processed"));
    }

    let Json(req) = body.unwrap_or_default();
    let (Some(lat), Some(lng)) = (req.donor_lat, req.donor_lng) else {
        return Err(ApiError::validation(
            "Real-time location coordinates are required",
        ));
    };
    let donor_at = Coordinates::parse(lat, lng)?;

    let donation = state
        .db
        .transition_donation(id, &[DonationStatus::Pending], DonationStatus::Scheduled)?
        .ok_or_else(|| ApiError::validation("Donation has already been processed"))?;
    state.db.set_user_location(user.id, donor_at)?;

    let request = state.db.get_blood_request(donation.blood_request_id)?;
    let patient_at = Coordinates::new(request.location_lat, request.location_long);
    let hospitals = state.db.list_hospitals()?;
    let selection = state.selector.select(&hospitals, donor_at, patient_at).await;

    let assignment = match &selection {
        Some(choice) => {
            state
                .db
                .set_donation_hospital(id, choice.hospital.id, choice.ai_recommended)?;
            Some(
                state
                    .db
                    .create_assignment(&donation, choice.hospital.id, choice.ai_recommended)?,
            )
        }
        None => {
            tracing::warn!(donation_id = %id, "No hospitals registered, donation left unassigned");
            None
        }
    };

    let (room, _) = state
        .db
        .get_or_create_chat_room(donation.id, user.id, request.patient_id)?;
    let patient = state.db.get_user(request.patient_id)?;

    state.notifier.send(
        patient.id,
        NotificationType::DonationAccepted,
        "Blood Request Accepted",
        format!(
            "Your blood request has been accepted by {}. You can now chat with them.",
            user.full_name()
        ),
        Some(room.id),
    )?;
    state.notifier.send(
        user.id,
        NotificationType::DonationAccepted,
        "Chat Room Created",
        format!(
            "You can now chat with {} about the donation",
            patient.full_name()
        ),
        Some(room.id),
    )?;
    if let Some(choice) = &selection {
        state.notifier.send(
            user.id,
            NotificationType::HospitalAssigned,
            "Hospital Assigned",
            format!(
                "Your donation has been scheduled at {}. Please visit for blood test.",
                choice.hospital.name
            ),
            Some(donation.id),
        )?;
    }

    tracing::info!(
        donation_id = %id,
        hospital_id = ?selection.as_ref().map(|s| s.hospital.id),
        ai_recommended = selection.as_ref().is_some_and(|s| s.ai_recommended),
        chat_room_id = %room.id,
        "Donation accepted"
    );

    Ok(Json(AcceptDonationResponse {
        message: "Donation accepted successfully".to_string(),
        ai_recommended: selection.as_ref().is_some_and(|s| s.ai_recommended),
        hospital: selection.map(|s| s.hospital),
        chat_room_id: room.id,
        assignment_id: assignment.map(|a| a.id),
    }))
}

/// GET /api/donations/:id/chat_room/
pub async fn donation_chat_room(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ChatRoomView>> {
    let (donation, _) = participant_donation(&state, &user, id)?;
    let room = state
        .db
        .find_chat_room_for_donation(donation.id)?
        .ok_or_else(|| ApiError::NotFound("Chat room not found for this donation".to_string()))?;
    if !room.is_participant(user.id) && !user.is_staff {
        return Err(ApiError::forbidden("You are not part of this chat room"));
    }
    Ok(Json(room_view(&state.db, room)?))
}

/// POST /api/complete-donation/:id/
pub async fn complete_donation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    if !user.is_staff {
        return Err(ApiError::forbidden(
            "Only hospital staff can complete donations",
        ));
    }
    finish_donation(&state, id)?;
    Ok(Json(MessageResponse::new("Donation marked as completed")))
}

const OPEN_DONATION: [DonationStatus; 2] = [DonationStatus::Pending, DonationStatus::Scheduled];

pub(crate) fn close_chat_room(state: &AppState, donation_id: Uuid) -> ApiResult<()> {
    if let Some(room) = state.db.find_chat_room_for_donation(donation_id)? {
        if room.is_active {
            state.db.set_chat_room_active(room.id, false)?;
        }
    }
    Ok(())
}

/// Cancel a pending or scheduled donation
///
/// Its hospital assignment is cancelled and its chat room closed. A
/// request left with no other open donation goes back to `pending` so
/// other donors can find it again.
pub(crate) fn withdraw_donation(state: &AppState, id: Uuid) -> ApiResult<Donation> {
    let donation = state
        .db
        .transition_donation(id, &OPEN_DONATION, DonationStatus::Cancelled)?
        .ok_or_else(|| {
            ApiError::validation("Only pending or scheduled donations can be cancelled")
        })?;

    if let Some(assignment) = state.db.find_assignment_for_donation(id)? {
        state.db.cancel_assignment(assignment.id)?;
    }
    close_chat_room(state, id)?;

    let request = state.db.get_blood_request(donation.blood_request_id)?;
    let reopened = matches!(
        request.status,
        RequestStatus::Accepted | RequestStatus::Donating
    ) && state.db.count_open_donations(request.id)? == 0;
    if reopened {
        state
            .db
            .set_request_status(request.id, RequestStatus::Pending)?;
    }

    tracing::info!(
        donation_id = %id,
        request_id = %request.id,
        request_reopened = reopened,
        "Donation cancelled"
    );
    Ok(donation)
}

/// Mark a donation completed and settle everything hanging off it
///
/// Completes its assignment and closes its chat room. Once the request has
/// as many completed donations as units required, the request is completed
/// and the donor gets a `life_saved` notification. Returns the donation and
/// whether the request was completed. Completing twice is a no-op;
/// a cancelled donation cannot be completed.
pub(crate) fn finish_donation(state: &AppState, id: Uuid) -> ApiResult<(Donation, bool)> {
    let donation = match state
        .db
        .transition_donation(id, &OPEN_DONATION, DonationStatus::Completed)?
    {
        Some(donation) => donation,
        None => {
            let current = state.db.get_donation(id)?;
            if current.status != DonationStatus::Completed {
                return Err(ApiError::validation(format!(
                    "A {} donation cannot be completed",
                    current.status
                )));
            }
            current
        }
    };

    if let Some(assignment) = state.db.find_assignment_for_donation(id)? {
        state.db.complete_assignment(assignment.id)?;
    }
    close_chat_room(state, id)?;

    let request = state.db.get_blood_request(donation.blood_request_id)?;
    let completed = state.db.count_completed_donations(request.id)?;
    let fulfilled =
        completed >= request.units_required && request.status != RequestStatus::Completed;
    if fulfilled {
        state
            .db
            .set_request_status(request.id, RequestStatus::Completed)?;
        state.notifier.send(
            donation.donor_id,
            NotificationType::LifeSaved,
            "Life Saved!",
            "Your blood donation has saved a life! Thank you for your contribution.",
            Some(donation.id),
        )?;
    }

    tracing::info!(
        donation_id = %id,
        request_id = %request.id,
        completed_units = completed,
        units_required = request.units_required,
        request_completed = fulfilled,
        "Donation completed"
    );
    Ok((donation, fulfilled))
}
