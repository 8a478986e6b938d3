//! Account Routes
//!
//! Registration, login and password reset for donor/patient accounts.
//!
//! - POST /api/auth/register/ - Create an account, returns tokens
//! - POST /api/auth/login/ - Exchange credentials for tokens
//! - POST /api/auth/logout/ - End the session
//! - POST /api/auth/request_password_reset/ - Email a reset link
//! - POST /api/auth/reset_password/ - Set a new password from a link
//! - POST /api/token/ - Obtain a token pair
//! - POST /api/token/refresh/ - Exchange a refresh token for an access token

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{
    validate_age, validate_email, AccessResponse, AuthResponse, LoginRequest, MessageResponse,
    PasswordResetConfirm, PasswordResetRequest, RefreshRequest, RegisterRequest,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::auth::{validate_password, AccountKind, AuthError, OutgoingMail, TokenPair};
use crate::domain::User;
use crate::geo::Coordinates;
use crate::storage::{NewUser, StorageError};

/// POST /api/auth/register/
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::validation("username is required"));
    }
    validate_email(&req.email)?;
    validate_age(req.age)?;
    validate_password(&req.password).map_err(ApiError::Validation)?;

    if state.db.get_user_by_username(&username)?.is_some() {
        return Err(ApiError::validation("A user with that username already exists."));
    }
    if state.db.get_user_by_email(req.email.trim())?.is_some() {
        return Err(ApiError::validation("A user with that email already exists."));
    }

    let location = match (req.location_lat, req.location_long) {
        (Some(lat), Some(lng)) => Some(Coordinates::parse(lat, lng)?),
        _ => geocode_address(&state, &req.address).await,
    };

    let new = NewUser {
        username,
        email: req.email.trim().to_string(),
        password_hash: state.auth.passwords.hash(&req.password)?,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        blood_group: req.blood_group,
        allergies: req.allergies.filter(|a| !a.trim().is_empty()),
        age: req.age,
        gender: req.gender,
        address: req.address,
        phone_number: req.phone_number,
        is_donor: req.is_donor,
        is_recipient: req.is_recipient,
        is_staff: false,
        location,
    };
    let user = state.db.create_user(&new)?;
    let tokens = state.auth.tokens.issue_pair(AccountKind::User, user.id)?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(auth_response(user, tokens, "User created successfully")),
    ))
}

/// Look up coordinates for an address; failures only log
async fn geocode_address(state: &AppState, address: &str) -> Option<Coordinates> {
    let geocoder = state.geocoder.as_ref()?;
    if address.trim().is_empty() {
        return None;
    }
    match geocoder.geocode(address).await {
        Ok(at) => Some(at),
        Err(e) => {
            tracing::warn!(error = %e, "Geocoding failed, registering without location");
            None
        }
    }
}

fn auth_response(user: User, tokens: TokenPair, message: &str) -> AuthResponse {
    AuthResponse {
        user,
        refresh: tokens.refresh,
        access: tokens.access,
        message: message.to_string(),
    }
}

/// Check a username/password pair against the user table
fn authenticate(state: &AppState, req: &LoginRequest) -> ApiResult<User> {
    let user = state
        .db
        .get_user_by_username(req.username.trim())?
        .ok_or(AuthError::InvalidCredentials)?;
    if !state.auth.passwords.verify(&req.password, &user.password_hash)? {
        tracing::debug!(username = %user.username, "Login rejected");
        return Err(AuthError::InvalidCredentials.into());
    }
    if !user.is_active {
        return Err(AuthError::Inactive.into());
    }
    Ok(user)
}

/// POST /api/auth/login/
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user = authenticate(&state, &req)?;
    let tokens = state.auth.tokens.issue_pair(AccountKind::User, user.id)?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(auth_response(user, tokens, "Login successful")))
}

/// POST /api/auth/logout/
///
/// Tokens are stateless; clients drop them. Open WebSocket sessions of
/// the account are closed.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Json<MessageResponse> {
    let sockets = state.ws_hub.disconnect_user(user.id).await;
    tracing::info!(user_id = %user.id, sockets, "User logged out");
    Json(MessageResponse::new("Logout successful"))
}

/// POST /api/auth/request_password_reset/
pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let user = state
        .db
        .get_user_by_email(req.email.trim())?
        .ok_or_else(|| ApiError::validation("No account found with this email address"))?;

    let token = state
        .auth
        .resets
        .make_token(AccountKind::User, user.id, &user.password_hash)?;
    let link = format!(
        "{}/reset-password/{}/",
        state.config.auth.frontend_url.trim_end_matches('/'),
        token
    );

    send_reset_mail(&state, &user.email, "Password Reset Request", &user.full_name(), &link)
        .await?;
    tracing::info!(user_id = %user.id, "Password reset requested");

    Ok(Json(MessageResponse::new(
        "Password reset link has been sent to your email",
    )))
}

pub(crate) async fn send_reset_mail(
    state: &AppState,
    to: &str,
    subject: &str,
    name: &str,
    link: &str,
) -> ApiResult<()> {
    let body = format!(
        "Hello {name},\n\n\
         You requested a password reset. Open the link below to choose a new password:\n\n\
         {link}\n\n\
         If you did not request this, you can ignore this email.\n"
    );
    state
        .mailer
        .send(OutgoingMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body,
        })
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))
}

/// POST /api/auth/reset_password/
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetConfirm>,
) -> ApiResult<Json<MessageResponse>> {
    let token = req.full_token();
    let id = state.auth.resets.decode_uid(&token)?;
    let user = state.db.get_user(id).map_err(|e| match e {
        StorageError::NotFound { .. } => ApiError::from(AuthError::InvalidResetToken),
        other => other.into(),
    })?;
    state
        .auth
        .resets
        .check_token(AccountKind::User, user.id, &user.password_hash, &token)?;
    validate_password(&req.new_password).map_err(ApiError::Validation)?;

    let hash = state.auth.passwords.hash(&req.new_password)?;
    state.db.set_user_password(user.id, &hash)?;
    tracing::info!(user_id = %user.id, "Password reset completed");

    Ok(Json(MessageResponse::new("Password has been reset successfully")))
}

/// POST /api/token/
pub async fn obtain_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenPair>> {
    let user = authenticate(&state, &req)?;
    Ok(Json(state.auth.tokens.issue_pair(AccountKind::User, user.id)?))
}

/// POST /api/token/refresh/
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<AccessResponse>> {
    let access = state.auth.tokens.refresh(&req.refresh)?;
    Ok(Json(AccessResponse { access }))
}
