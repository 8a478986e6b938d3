//! PBKDF2-HMAC-SHA256 password hashing
//!
//! Stored form: `pbkdf2_sha256$<iterations>$<salt_b64>$<hash_b64>`.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::error::{AuthError, AuthResult};

const ALGORITHM: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn hash(&self, password: &str) -> AuthResult<String> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let derived = derive(password.as_bytes(), &salt, self.iterations);
        Ok(format!(
            "{ALGORITHM}${}${}${}",
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(derived)
        ))
    }

    /// Check `password` against a stored hash
    ///
    /// The iteration count is read from the stored value, so hashes made
    /// with an older setting keep verifying.
    pub fn verify(&self, password: &str, stored: &str) -> AuthResult<bool> {
        let mut parts = stored.split('$');
        let (Some(ALGORITHM), Some(iterations), Some(salt), Some(hash), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(AuthError::MalformedHash);
        };

        let iterations: u32 = iterations.parse().map_err(|_| AuthError::MalformedHash)?;
        let salt = STANDARD_NO_PAD
            .decode(salt)
            .map_err(|_| AuthError::MalformedHash)?;
        let expected = STANDARD_NO_PAD
            .decode(hash)
            .map_err(|_| AuthError::MalformedHash)?;

        if iterations == 0 {
            return Err(AuthError::MalformedHash);
        }
        let derived = derive(password.as_bytes(), &salt, iterations);
        Ok(derived.as_slice().ct_eq(expected.as_slice()).into())
    }
}

/// Reject passwords the account forms would reject
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err("This password is entirely numeric.".to_string());
    }
    Ok(())
}

fn derive(password: &[u8], salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}
