//! Authentication error types

use thiserror::Error;

use super::TokenType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    Inactive,

    #[error("Authentication credentials were not provided")]
    MissingToken,

    #[error("Token is invalid: {0}")]
    InvalidToken(String),

    #[error("Token has expired")]
    Expired,

    #[error("Expected {expected} token, got {found}")]
    WrongTokenType { expected: TokenType, found: TokenType },

    #[error("Token is not valid for this kind of account")]
    WrongAccountKind,

    #[error("Invalid or expired reset link")]
    InvalidResetToken,

    #[error("Stored password hash is malformed")]
    MalformedHash,

    #[error("Crypto error: {0}")]
    Crypto(String),
}

pub type AuthResult<T> = Result<T, AuthError>;
