//! Authentication
//!
//! - **password**: PBKDF2-HMAC-SHA256 hashing and password rules
//! - **token**: HS256 access/refresh tokens for both account kinds
//! - **reset**: signed, expiring password-reset links
//! - **mailer**: delivery of reset links
//!
//! [`AuthService`] bundles the three credential components so request
//! handlers carry a single handle.

mod error;
mod mailer;
mod password;
mod reset;
mod token;

pub use error::{AuthError, AuthResult};
pub use mailer::{LogMailer, MailError, Mailer, OutgoingMail};
pub use password::{validate_password, PasswordHasher, MIN_PASSWORD_LEN};
pub use reset::ResetTokens;
pub use token::{AccountKind, Claims, TokenPair, TokenService, TokenType};

#[cfg(test)]
pub use mailer::MemoryMailer;

use chrono::Duration;

use crate::config::AuthConfig;

#[derive(Clone)]
pub struct AuthService {
    pub passwords: PasswordHasher,
    pub tokens: TokenService,
    pub resets: ResetTokens,
}

impl AuthService {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            passwords: PasswordHasher::new(config.password_iterations),
            tokens: TokenService::new(
                &config.jwt_secret,
                Duration::minutes(config.access_token_minutes),
                Duration::days(config.refresh_token_days),
            ),
            resets: ResetTokens::new(
                &config.jwt_secret,
                Duration::hours(config.reset_token_ttl_hours),
            ),
        }
    }
}
