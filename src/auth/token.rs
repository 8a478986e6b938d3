//! HS256 JSON Web Tokens
//!
//! Donor/patient accounts and hospital staff share the signing key and
//! are told apart by the `kind` claim.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::{AuthError, AuthResult};

/// Upper bound on accepted token length
const MAX_TOKEN_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    User,
    Hospital,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => f.write_str("access"),
            TokenType::Refresh => f.write_str("refresh"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub kind: AccountKind,
    pub typ: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issues and verifies signed tokens
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: impl AsRef<[u8]>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_ref()),
            decoding: DecodingKey::from_secret(secret.as_ref()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, kind: AccountKind, sub: Uuid, typ: TokenType) -> AuthResult<String> {
        self.issue_at(kind, sub, typ, Utc::now().timestamp())
    }

    pub fn issue_pair(&self, kind: AccountKind, sub: Uuid) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue(kind, sub, TokenType::Access)?,
            refresh: self.issue(kind, sub, TokenType::Refresh)?,
        })
    }

    /// Exchange a refresh token for a new access token of the same kind
    pub fn refresh(&self, refresh_token: &str) -> AuthResult<String> {
        let claims = self.verify(refresh_token, TokenType::Refresh)?;
        self.issue(claims.kind, claims.sub, TokenType::Access)
    }

    pub fn verify(&self, token: &str, expected: TokenType) -> AuthResult<Claims> {
        self.verify_at(token, expected, Utc::now().timestamp())
    }

    fn issue_at(
        &self,
        kind: AccountKind,
        sub: Uuid,
        typ: TokenType,
        now: i64,
    ) -> AuthResult<String> {
        let ttl = match typ {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub,
            kind,
            typ,
            iat: now,
            exp: now + ttl.num_seconds(),
            jti: Uuid::new_v4(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Crypto(e.to_string()))
    }

    fn verify_at(&self, token: &str, expected: TokenType, now: i64) -> AuthResult<Claims> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(AuthError::InvalidToken("token too long".to_string()));
        }

        // Expiry is checked below against `now`, without leeway
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature => {
                    AuthError::InvalidToken("signature mismatch".to_string())
                }
                _ => AuthError::InvalidToken(e.to_string()),
            })?
            .claims;

        if claims.exp <= now {
            return Err(AuthError::Expired);
        }
        if claims.typ != expected {
            return Err(AuthError::WrongTokenType {
                expected,
                found: claims.typ,
            });
        }
        Ok(claims)
    }
}
