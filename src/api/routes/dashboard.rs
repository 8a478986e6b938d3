//! Hospital Dashboard Routes
//!
//! Hospital-token endpoints for the donors assigned to the caller's
//! hospital. Assignments of other hospitals are reported as missing.
//!
//! - GET /api/hospital-dashboard/donors/
//! - POST /api/hospital-dashboard/assignments/:id/submit_blood_test/
//! - PUT|PATCH /api/hospital-dashboard/assignments/:id/update_blood_test/
//! - POST /api/hospital-dashboard/assignments/:id/generate_prediction/
//! - POST /api/hospital-dashboard/assignments/:id/mark_as_completed/

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::blood_tests::analyze;
use super::donations::{close_chat_room, finish_donation};
use crate::api::dto::{
    BloodTestPatch, CompletionResponse, DashboardDonor, PredictionResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentHospital;
use crate::api::state::AppState;
use crate::domain::{
    Assignment, AssignmentStatus, BloodPanel, BloodTest, Donation, NotificationType, User,
};

/// An assignment of the caller's hospital with its donation and donor
struct AssignedDonation {
    assignment: Assignment,
    donation: Donation,
    donor: User,
}

fn load_assignment(
    state: &AppState,
    current: &CurrentHospital,
    id: Uuid,
) -> ApiResult<AssignedDonation> {
    let assignment = state.db.get_assignment_for_hospital(id, current.hospital.id)?;
    let donation = state.db.get_donation(assignment.donation_id)?;
    let donor = state.db.get_user(assignment.donor_id)?;
    Ok(AssignedDonation {
        assignment,
        donation,
        donor,
    })
}

fn existing_test(state: &AppState, donation: &Donation) -> ApiResult<BloodTest> {
    state
        .db
        .find_blood_test_for_donation(donation.id)?
        .ok_or_else(|| ApiError::NotFound("No blood test found for this donation".to_string()))
}

/// GET /api/hospital-dashboard/donors/
pub async fn list_donors(
    State(state): State<Arc<AppState>>,
    current: CurrentHospital,
) -> ApiResult<Json<Vec<DashboardDonor>>> {
    let assignments = state.db.list_assignments_for_hospital(current.hospital.id)?;
    let mut donors = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let donation = state.db.get_donation(assignment.donation_id)?;
        let donor = state.db.get_user(assignment.donor_id)?;
        let test = state.db.find_blood_test_for_donation(donation.id)?;
        donors.push(DashboardDonor::new(donor, assignment, donation, test));
    }
    Ok(Json(donors))
}

/// POST /api/hospital-dashboard/assignments/:id/submit_blood_test/
///
/// Creates or overwrites the donation's test, analyses it, tells the donor
/// and closes the chat room.
pub async fn submit_blood_test(
    State(state): State<Arc<AppState>>,
    current: CurrentHospital,
    Path(id): Path<Uuid>,
    Json(panel): Json<BloodPanel>,
) -> ApiResult<Json<BloodTest>> {
    let assigned = load_assignment(&state, &current, id)?;
    if assigned.assignment.status == AssignmentStatus::Cancelled {
        return Err(ApiError::validation(
            "This donation was cancelled by the donor",
        ));
    }
    let (test, created) =
        state
            .db
            .upsert_blood_test(assigned.donation.id, current.hospital.id, &panel)?;

    let (test, prediction) = analyze(&state, test, &assigned.donor).await?;
    state.notifier.send(
        assigned.donor.id,
        NotificationType::HealthAlert,
        "Blood Test Analysis Complete",
        prediction.notification_message,
        Some(test.id),
    )?;
    close_chat_room(&state, assigned.donation.id)?;

    tracing::info!(
        assignment_id = %assigned.assignment.id,
        blood_test_id = %test.id,
        created,
        "Blood test submitted"
    );
    Ok(Json(test))
}

/// PUT|PATCH /api/hospital-dashboard/assignments/:id/update_blood_test/
pub async fn update_blood_test(
    State(state): State<Arc<AppState>>,
    current: CurrentHospital,
    Path(id): Path<Uuid>,
    Json(patch): Json<BloodTestPatch>,
) -> ApiResult<Json<BloodTest>> {
    let assigned = load_assignment(&state, &current, id)?;
    let mut test = existing_test(&state, &assigned.donation)?;

    let markers_changed = patch.apply_panel(&mut test.panel);
    let newly_saved = patch.life_saved == Some(true) && !test.life_saved;
    if let Some(life_saved) = patch.life_saved {
        test.life_saved = life_saved;
    }
    state.db.update_blood_test(&test)?;

    if newly_saved {
        state.notifier.send(
            assigned.donor.id,
            NotificationType::LifeSaved,
            "You Saved a Life!",
            "Your blood donation has been used to save a life. \
             Thank you for your heroic contribution!",
            Some(assigned.donation.id),
        )?;
    }
    if markers_changed {
        test = analyze(&state, test, &assigned.donor).await?.0;
    }

    Ok(Json(test))
}

/// POST /api/hospital-dashboard/assignments/:id/generate_prediction/
pub async fn generate_prediction(
    State(state): State<Arc<AppState>>,
    current: CurrentHospital,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PredictionResponse>> {
    let assigned = load_assignment(&state, &current, id)?;
    let test = existing_test(&state, &assigned.donation)?;

    let (test, prediction) = analyze(&state, test, &assigned.donor).await?;
    state.notifier.send(
        assigned.donor.id,
        NotificationType::HealthAlert,
        "AI Health Analysis Complete",
        format!("AI health analysis completed: {}", prediction.summary),
        Some(test.id),
    )?;

    Ok(Json(PredictionResponse {
        message: "AI prediction generated successfully".to_string(),
        summary: prediction.summary,
        confidence: prediction.confidence,
    }))
}

/// POST /api/hospital-dashboard/assignments/:id/mark_as_completed/
pub async fn mark_as_completed(
    State(state): State<Arc<AppState>>,
    current: CurrentHospital,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CompletionResponse>> {
    let assigned = load_assignment(&state, &current, id)?;
    let (donation, _) = finish_donation(&state, assigned.donation.id)?;

    Ok(Json(CompletionResponse {
        status: "completed".to_string(),
        assignment_id: assigned.assignment.id,
        donation_id: donation.id,
        donation_date: donation.donation_date,
    }))
}
