//! Hospital Account Routes
//!
//! Hospital staff have their own accounts and tokens; a hospital token is
//! rejected by donor endpoints and vice versa.
//!
//! - POST /api/hospital-auth/register/ - Create a hospital and its login
//! - POST /api/hospital-auth/login/
//! - POST /api/hospital-auth/logout/
//! - POST /api/hospital-auth/request_password_reset/
//! - POST /api/hospital-auth/reset_password/

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use super::auth::send_reset_mail;
use crate::api::dto::{
    required_text, validate_email, HospitalLoginResponse, HospitalRegisterRequest,
    HospitalRegisterResponse, LoginRequest, MessageResponse, PasswordResetConfirm,
    PasswordResetRequest,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentHospital;
use crate::api::state::AppState;
use crate::auth::{validate_password, AccountKind, AuthError};
use crate::geo::Coordinates;
use crate::storage::{NewHospital, NewHospitalAccount, StorageError};

/// POST /api/hospital-auth/register/
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HospitalRegisterRequest>,
) -> ApiResult<(StatusCode, Json<HospitalRegisterResponse>)> {
    let username = required_text("username", req.username)?;
    let name = required_text("name", req.name)?;
    validate_email(&req.email)?;
    validate_password(&req.password).map_err(ApiError::Validation)?;
    let location = Coordinates::parse(req.location_lat, req.location_long)?;

    if state.db.get_hospital_user_by_username(&username)?.is_some() {
        return Err(ApiError::validation("Username already exists"));
    }
    if state.db.get_hospital_user_by_email(req.email.trim())?.is_some() {
        return Err(ApiError::validation("Email already exists"));
    }

    let hospital = NewHospital {
        name,
        address: req.address,
        phone_number: req.phone_number,
        email: Some(req.email.trim().to_string()),
        location,
    };
    let account = NewHospitalAccount {
        username,
        email: req.email.trim().to_string(),
        password_hash: state.auth.passwords.hash(&req.password)?,
    };
    let (hospital, account) = state.db.create_hospital_with_account(&hospital, &account)?;

    Ok((
        StatusCode::CREATED,
        Json(HospitalRegisterResponse {
            message: "Hospital registered successfully".to_string(),
            hospital,
            username: account.username,
        }),
    ))
}

/// POST /api/hospital-auth/login/
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<HospitalLoginResponse>> {
    let account = state
        .db
        .get_hospital_user_by_username(req.username.trim())?
        .ok_or(AuthError::InvalidCredentials)?;
    if !state.auth.passwords.verify(&req.password, &account.password_hash)? {
        return Err(AuthError::InvalidCredentials.into());
    }
    if !account.is_active {
        return Err(AuthError::Inactive.into());
    }

    let hospital = state.db.get_hospital(account.hospital_id)?;
    let tokens = state.auth.tokens.issue_pair(AccountKind::Hospital, account.id)?;
    state.db.touch_hospital_user_login(account.id)?;

    tracing::info!(
        hospital_user_id = %account.id,
        hospital_id = %hospital.id,
        "Hospital staff logged in"
    );

    Ok(Json(HospitalLoginResponse {
        hospital_user: account,
        hospital,
        refresh: tokens.refresh,
        access: tokens.access,
        message: "Login successful".to_string(),
    }))
}

/// POST /api/hospital-auth/logout/
pub async fn logout(current: CurrentHospital) -> Json<MessageResponse> {
    tracing::info!(hospital_user_id = %current.account.id, "Hospital staff logged out");
    Json(MessageResponse::new("Logout successful"))
}

/// POST /api/hospital-auth/request_password_reset/
pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let account = state
        .db
        .get_hospital_user_by_email(req.email.trim())?
        .ok_or_else(|| ApiError::validation("No hospital account found with this email address"))?;
    let hospital = state.db.get_hospital(account.hospital_id)?;

    let token = state
        .auth
        .resets
        .make_token(AccountKind::Hospital, account.id, &account.password_hash)?;
    let link = format!(
        "{}/hospital-reset-password/{}/",
        state.config.auth.frontend_url.trim_end_matches('/'),
        token
    );

    send_reset_mail(
        &state,
        &account.email,
        "Hospital Password Reset Request",
        &hospital.name,
        &link,
    )
    .await?;
    tracing::info!(hospital_user_id = %account.id, "Hospital password reset requested");

    Ok(Json(MessageResponse::new(
        "Password reset link has been sent to your email",
    )))
}

/// POST /api/hospital-auth/reset_password/
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetConfirm>,
) -> ApiResult<Json<MessageResponse>> {
    let token = req.full_token();
    let id = state.auth.resets.decode_uid(&token)?;
    let account = state.db.get_hospital_user(id).map_err(|e| match e {
        StorageError::NotFound { .. } => ApiError::from(AuthError::InvalidResetToken),
        other => other.into(),
    })?;
    state.auth.resets.check_token(
        AccountKind::Hospital,
        account.id,
        &account.password_hash,
        &token,
    )?;
    validate_password(&req.new_password).map_err(ApiError::Validation)?;

    let hash = state.auth.passwords.hash(&req.new_password)?;
    state.db.set_hospital_user_password(account.id, &hash)?;
    tracing::info!(hospital_user_id = %account.id, "Hospital password reset completed");

    Ok(Json(MessageResponse::new("Password has been reset successfully")))
}
