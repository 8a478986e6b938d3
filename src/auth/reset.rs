//! Password-reset links
//!
//! A token reads `<uid_b64>/<ts_b36>-<hmac_hex>`. The HMAC covers the
//! account kind, id, current password hash and issue time, so changing the
//! password invalidates every outstanding link.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use super::error::{AuthError, AuthResult};
use super::token::AccountKind;

type HmacSha256 = Hmac<Sha256>;

const KEY_SALT: &[u8] = b"project-red.password-reset";

#[derive(Clone)]
pub struct ResetTokens {
    secret: Vec<u8>,
    ttl: Duration,
}

impl ResetTokens {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl,
        }
    }

    pub fn make_token(
        &self,
        kind: AccountKind,
        id: Uuid,
        password_hash: &str,
    ) -> AuthResult<String> {
        self.make_token_at(kind, id, password_hash, Utc::now().timestamp())
    }

    /// Account id carried by a token, before the signature is checked
    pub fn decode_uid(&self, token: &str) -> AuthResult<Uuid> {
        let (uid, _) = split(token)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(uid.trim_end_matches('='))
            .map_err(|_| AuthError::InvalidResetToken)?;
        let text = String::from_utf8(bytes).map_err(|_| AuthError::InvalidResetToken)?;
        text.parse().map_err(|_| AuthError::InvalidResetToken)
    }

    pub fn check_token(
        &self,
        kind: AccountKind,
        id: Uuid,
        password_hash: &str,
        token: &str,
    ) -> AuthResult<()> {
        self.check_token_at(kind, id, password_hash, token, Utc::now().timestamp())
    }

    fn make_token_at(
        &self,
        kind: AccountKind,
        id: Uuid,
        password_hash: &str,
        now: i64,
    ) -> AuthResult<String> {
        let uid = URL_SAFE_NO_PAD.encode(id.to_string());
        let ts = to_base36(now.max(0) as u64);
        let sig = self.mac(kind, id, password_hash, &ts)?.finalize().into_bytes();
        Ok(format!("{uid}/{ts}-{}", hex::encode(sig)))
    }

    fn check_token_at(
        &self,
        kind: AccountKind,
        id: Uuid,
        password_hash: &str,
        token: &str,
        now: i64,
    ) -> AuthResult<()> {
        if self.decode_uid(token)? != id {
            return Err(AuthError::InvalidResetToken);
        }
        let (_, rest) = split(token)?;
        let (ts, sig) = rest.split_once('-').ok_or(AuthError::InvalidResetToken)?;

        let sig = hex::decode(sig).map_err(|_| AuthError::InvalidResetToken)?;
        self.mac(kind, id, password_hash, ts)?
            .verify_slice(&sig)
            .map_err(|_| AuthError::InvalidResetToken)?;

        let issued = from_base36(ts).ok_or(AuthError::InvalidResetToken)? as i64;
        if now - issued > self.ttl.num_seconds() {
            return Err(AuthError::InvalidResetToken);
        }
        Ok(())
    }

    fn mac(
        &self,
        kind: AccountKind,
        id: Uuid,
        password_hash: &str,
        ts: &str,
    ) -> AuthResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AuthError::Crypto(e.to_string()))?;
        mac.update(KEY_SALT);
        let kind = match kind {
            AccountKind::User => "user",
            AccountKind::Hospital => "hospital",
        };
        let id = id.to_string();
        for part in [kind, id.as_str(), password_hash, ts] {
            mac.update(part.as_bytes());
            mac.update(b"|");
        }
        Ok(mac)
    }
}

/// `(uid, "ts-sig")` from either `uid/ts-sig` or `uid/ts-sig/`
fn split(token: &str) -> AuthResult<(&str, &str)> {
    let mut parts = token.trim().trim_matches('/').rsplit('/');
    let rest = parts.next().ok_or(AuthError::InvalidResetToken)?;
    let uid = parts.next().ok_or(AuthError::InvalidResetToken)?;
    if uid.is_empty() || rest.is_empty() {
        return Err(AuthError::InvalidResetToken);
    }
    Ok((uid, rest))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn from_base36(s: &str) -> Option<u64> {
    if s.is_empty() || s.len() > 13 {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> ResetTokens {
        ResetTokens::new("reset-secret", Duration::hours(72))
    }

    #[test]
    fn test_token_round_trip() {
        let tokens = tokens();
        let id = Uuid::new_v4();
        let token = tokens.make_token(AccountKind::User, id, "hash-1").unwrap();

        assert_eq!(token.matches('/').count(), 1);
        assert_eq!(tokens.decode_uid(&token).unwrap(), id);
        tokens
            .check_token(AccountKind::User, id, "hash-1", &token)
            .unwrap();
        tokens
            .check_token(AccountKind::User, id, "hash-1", &format!("{token}/"))
            .unwrap();
    }

    #[test]
    fn test_password_change_invalidates() {
        let tokens = tokens();
        let id = Uuid::new_v4();
        let token = tokens.make_token(AccountKind::User, id, "hash-1").unwrap();
        assert_eq!(
            tokens.check_token(AccountKind::User, id, "hash-2", &token),
            Err(AuthError::InvalidResetToken)
        );
    }

    #[test]
    fn test_kind_and_id_are_bound() {
        let tokens = tokens();
        let id = Uuid::new_v4();
        let token = tokens.make_token(AccountKind::Hospital, id, "h").unwrap();
        assert!(tokens.check_token(AccountKind::User, id, "h", &token).is_err());
        assert!(tokens
            .check_token(AccountKind::Hospital, Uuid::new_v4(), "h", &token)
            .is_err());
    }

    #[test]
    fn test_expiry() {
        let tokens = tokens();
        let id = Uuid::new_v4();
        let issued = 1_700_000_000;
        let token = tokens
            .make_token_at(AccountKind::User, id, "h", issued)
            .unwrap();
        assert!(tokens
            .check_token_at(AccountKind::User, id, "h", &token, issued + 72 * 3600)
            .is_ok());
        assert!(tokens
            .check_token_at(AccountKind::User, id, "h", &token, issued + 72 * 3600 + 1)
            .is_err());
    }

    #[test]
    fn test_signature_is_lowercase_hex() {
        let tokens = tokens();
        let id = Uuid::new_v4();
        let token = tokens.make_token(AccountKind::User, id, "h").unwrap();
        let (_, sig) = token.rsplit_once('-').unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));

        // Same bytes in upper case still decode and verify
        let upper = format!("{}-{}", &token[..token.len() - 65], sig.to_uppercase());
        assert!(tokens.check_token(AccountKind::User, id, "h", &upper).is_ok());
    }

    #[test]
    fn test_bad_signatures_rejected() {
        let tokens = tokens();
        let id = Uuid::new_v4();
        let token = tokens.make_token(AccountKind::User, id, "h").unwrap();
        let (head, sig) = token.rsplit_once('-').unwrap();

        for bad in [
            format!("{head}-{}", &sig[..62]),
            format!("{head}-{}zz", &sig[..62]),
            format!("{head}-"),
            format!("{head}-{sig}00"),
        ] {
            assert_eq!(
                tokens.check_token(AccountKind::User, id, "h", &bad),
                Err(AuthError::InvalidResetToken),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_garbage_tokens() {
        let tokens = tokens();
        assert!(tokens.decode_uid("").is_err());
        assert!(tokens.decode_uid("no-slash").is_err());
        assert!(tokens.decode_uid("!!!/abc-def").is_err());
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(from_base36(&to_base36(1_700_000_000)), Some(1_700_000_000));
        assert_eq!(from_base36("not base36!"), None);
    }
}
