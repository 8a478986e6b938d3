//! Request authentication
//!
//! Handlers take [`CurrentUser`] or [`CurrentHospital`] as an argument to
//! require a bearer access token of that account kind.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::sync::Arc;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::auth::{AccountKind, AuthError, TokenType};
use crate::domain::{Hospital, HospitalUser, User};
use crate::storage::StorageError;

/// An authenticated donor/patient account
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// An authenticated hospital staff account and its hospital
#[derive(Debug, Clone)]
pub struct CurrentHospital {
    pub account: HospitalUser,
    pub hospital: Hospital,
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then_some(token.trim())
        .filter(|token| !token.is_empty())
}

/// Resolve an access token to an active user account
pub(crate) fn user_from_token(state: &AppState, token: &str) -> ApiResult<User> {
    let claims = state.auth.tokens.verify(token, TokenType::Access)?;
    if claims.kind != AccountKind::User {
        return Err(AuthError::WrongAccountKind.into());
    }
    let user = state.db.get_user(claims.sub).map_err(unknown_subject)?;
    if !user.is_active {
        return Err(AuthError::Inactive.into());
    }
    Ok(user)
}

fn hospital_from_token(state: &AppState, token: &str) -> ApiResult<CurrentHospital> {
    let claims = state.auth.tokens.verify(token, TokenType::Access)?;
    if claims.kind != AccountKind::Hospital {
        return Err(AuthError::WrongAccountKind.into());
    }
    let account = state.db.get_hospital_user(claims.sub).map_err(unknown_subject)?;
    if !account.is_active {
        return Err(AuthError::Inactive.into());
    }
    let hospital = state.db.get_hospital(account.hospital_id)?;
    Ok(CurrentHospital { account, hospital })
}

fn unknown_subject(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound { .. } => {
            AuthError::InvalidToken("account no longer exists".to_string()).into()
        }
        other => other.into(),
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingToken)?;
        user_from_token(state, token).map(CurrentUser)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentHospital {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingToken)?;
        hospital_from_token(state, token)
    }
}
