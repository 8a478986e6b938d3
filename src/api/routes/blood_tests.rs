//! Blood Test Routes
//!
//! - GET /api/blood-tests/ - Staff: all tests; donors: their own
//! - POST /api/blood-tests/ - Staff record a test; triggers a prediction
//! - GET /api/blood-tests/:id/

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{test_view, views};
use crate::api::dto::{BloodTestInput, BloodTestView};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::domain::{BloodTest, NotificationType, User};
use crate::prediction::{DonorInfo, Prediction};
use crate::storage::StoredPrediction;

/// GET /api/blood-tests/
pub async fn list_tests(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<BloodTestView>>> {
    let tests = if user.is_staff {
        state.db.list_blood_tests()?
    } else {
        state.db.list_blood_tests_for_donor(user.id)?
    };
    Ok(Json(views(&state.db, tests, test_view)?))
}

/// POST /api/blood-tests/
pub async fn create_test(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<BloodTestInput>,
) -> ApiResult<(StatusCode, Json<BloodTestView>)> {
    if !user.is_staff {
        return Err(ApiError::forbidden("Only staff can record blood tests"));
    }
    let donation = state.db.get_donation(req.donation)?;
    let tested_by = req
        .tested_by
        .or(donation.hospital_id)
        .ok_or_else(|| ApiError::validation("tested_by is required for an unassigned donation"))?;
    state.db.get_hospital(tested_by)?;

    let (test, _) = state.db.upsert_blood_test(donation.id, tested_by, &req.panel)?;
    let donor = state.db.get_user(donation.donor_id)?;
    let (test, prediction) = analyze(&state, test, &donor).await?;

    state.notifier.send(
        donor.id,
        NotificationType::HealthAlert,
        "Blood Test Results",
        format!(
            "Your blood test results are ready. {}",
            prediction.notification_message
        ),
        Some(test.id),
    )?;

    Ok((StatusCode::CREATED, Json(test_view(&state.db, test)?)))
}

/// GET /api/blood-tests/:id/
pub async fn get_test(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BloodTestView>> {
    let test = state.db.get_blood_test(id)?;
    if !user.is_staff {
        let donation = state.db.get_donation(test.donation_id)?;
        if donation.donor_id != user.id {
            return Err(ApiError::forbidden(
                "You do not have permission to view this blood test",
            ));
        }
    }
    Ok(Json(test_view(&state.db, test)?))
}

/// Run the predictor on a stored test and save its output
pub(crate) async fn analyze(
    state: &AppState,
    mut test: BloodTest,
    donor: &User,
) -> ApiResult<(BloodTest, Prediction)> {
    let info = DonorInfo {
        name: donor.full_name(),
        age: donor.age,
        gender: donor.gender,
    };
    let prediction = state.predictor.predict(&test.panel, &info).await;

    let stored = StoredPrediction {
        health_risk_prediction: Some(prediction.full_prediction.clone()),
        disease_prediction: Some(prediction.summary.clone()),
        prediction_confidence: Some(prediction.confidence),
    };
    state.db.set_blood_test_prediction(test.id, &stored)?;
    test.health_risk_prediction = stored.health_risk_prediction;
    test.disease_prediction = stored.disease_prediction;
    test.prediction_confidence = stored.prediction_confidence;

    tracing::info!(
        blood_test_id = %test.id,
        donor_id = %donor.id,
        confidence = prediction.confidence,
        abnormal = prediction.has_abnormalities,
        "Blood test analysed"
    );
    Ok((test, prediction))
}
