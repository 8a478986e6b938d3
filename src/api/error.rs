//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::geo::GeoError;
use crate::matching::MatchingError;
use crate::storage::StorageError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Matching(#[from] MatchingError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable (dependency down)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<GeoError> for ApiError {
    fn from(err: GeoError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "NOT_AUTHENTICATED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Auth(e) => match e {
                AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
                AuthError::Inactive => (StatusCode::FORBIDDEN, "ACCOUNT_DISABLED"),
                AuthError::MissingToken
                | AuthError::InvalidToken(_)
                | AuthError::Expired
                | AuthError::WrongTokenType { .. } => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID"),
                AuthError::WrongAccountKind => (StatusCode::FORBIDDEN, "WRONG_ACCOUNT_KIND"),
                AuthError::InvalidResetToken => (StatusCode::BAD_REQUEST, "INVALID_RESET_TOKEN"),
                AuthError::MalformedHash | AuthError::Crypto(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_ERROR")
                }
            },
            ApiError::Storage(e) => storage_status(e),
            ApiError::Matching(e) => match e {
                MatchingError::NotADonor => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
                MatchingError::MissingLocation => (StatusCode::BAD_REQUEST, "LOCATION_REQUIRED"),
                MatchingError::Storage(e) => storage_status(e),
            },
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

fn storage_status(err: &StorageError) -> (StatusCode, &'static str) {
    match err {
        StorageError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        StorageError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::debug!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenType;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::validation("bad"), StatusCode::BAD_REQUEST),
            (ApiError::forbidden("no"), StatusCode::FORBIDDEN),
            (
                ApiError::Storage(StorageError::not_found("User", 1)),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Storage(StorageError::Conflict("username".to_string())),
                StatusCode::CONFLICT,
            ),
            (ApiError::Auth(AuthError::MissingToken), StatusCode::UNAUTHORIZED),
            (
                ApiError::Auth(AuthError::WrongTokenType {
                    expected: TokenType::Access,
                    found: TokenType::Refresh,
                }),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::Auth(AuthError::WrongAccountKind),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::Matching(MatchingError::MissingLocation),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(GeoError::LatitudeOutOfRange(99.0)),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status_and_code().0, expected, "{}", err);
        }
    }

    #[test]
    fn test_response_has_error_body() {
        let response = ApiError::NotFound("Donation".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
