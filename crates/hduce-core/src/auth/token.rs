//! Offline inspection of bearer tokens.
//!
//! Tokens are JWTs issued by the auth service. The client only reads the
//! claims to decide whether a token is worth sending; the signature is
//! checked server-side by `GET /auth/verify`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Leeway for "expiring soon" checks, in seconds.
pub const EXPIRING_SOON_LEEWAY_SECS: i64 = 300;

/// Leeway for hard expiry checks.
pub const HARD_EXPIRY_LEEWAY_SECS: i64 = 0;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Token must have 3 segments, found {0}")]
    Segments(usize),

    #[error("Token payload is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Token payload is not valid claims JSON: {0}")]
    Claims(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Claims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| DateTime::from_timestamp(iat, 0))
    }

    /// Seconds left before `exp`; negative once expired.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.exp.saturating_sub(now.timestamp())
    }
}

/// Decode the claims segment of a token without verifying its signature.
pub fn decode(token: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::Segments(segments.len()));
    }

    // Some issuers keep the base64 padding; the URL-safe engine rejects it.
    let payload = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Whether `token` expires within `leeway_secs` from now.
/// Tokens that cannot be decoded count as expired.
pub fn is_expired(token: &str, leeway_secs: i64) -> bool {
    is_expired_at(token, leeway_secs, Utc::now())
}

pub fn is_expired_at(token: &str, leeway_secs: i64, now: DateTime<Utc>) -> bool {
    match decode(token) {
        // A token is no longer valid from its `exp` second on.
        Ok(claims) => claims.seconds_remaining(now) <= leeway_secs,
        Err(e) => {
            tracing::debug!(error = %e, "Undecodable token treated as expired");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{token_with_claims, token_with_exp};
    use chrono::Duration;

    #[test]
    fn test_decode_claims() {
        let token = token_with_claims(serde_json::json!({
            "sub": "7",
            "email": "ana@hduce.test",
            "username": "ana",
            "user_id": 7,
            "iat": 1_790_000_000,
            "exp": 1_790_003_600,
        }));

        let claims = decode(&token).expect("decodable token");
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.email, "ana@hduce.test");
        assert_eq!(claims.user_id, Some(7));
        assert_eq!(claims.issued_at().map(|t| t.timestamp()), Some(1_790_000_000));
        assert_eq!(claims.expires_at().map(|t| t.timestamp()), Some(1_790_003_600));
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(matches!(decode(""), Err(DecodeError::Segments(1))));
        assert!(matches!(decode("a.b"), Err(DecodeError::Segments(2))));
        assert!(matches!(decode("a.!!!.c"), Err(DecodeError::Base64(_))));

        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("not json"));
        assert!(matches!(decode(&not_json), Err(DecodeError::Claims(_))));

        let missing_exp = token_with_claims(serde_json::json!({ "sub": "1" }));
        assert!(matches!(decode(&missing_exp), Err(DecodeError::Claims(_))));
    }

    #[test]
    fn test_decode_only_needs_exp() {
        let token = token_with_claims(serde_json::json!({ "exp": 1_790_000_000 }));
        let claims = decode(&token).expect("exp alone is enough");
        assert_eq!(claims.sub, "");
        assert_eq!(claims.exp, 1_790_000_000);
    }

    #[test]
    fn test_extreme_exp_values() {
        let now = Utc::now();
        let long_gone = token_with_claims(serde_json::json!({ "sub": "1", "exp": i64::MIN }));
        let far_future = token_with_claims(serde_json::json!({ "sub": "1", "exp": i64::MAX }));

        assert!(is_expired_at(&long_gone, HARD_EXPIRY_LEEWAY_SECS, now));
        assert!(is_expired_at(&long_gone, EXPIRING_SOON_LEEWAY_SECS, now));
        assert!(!is_expired_at(&far_future, EXPIRING_SOON_LEEWAY_SECS, now));
        assert_eq!(decode(&long_gone).unwrap().seconds_remaining(now), i64::MIN);
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE
            .encode(r#"{"sub":"12","exp":1790000000}"#);
        let token = format!("h.{}.s", payload);
        assert_eq!(decode(&token).unwrap().exp, 1_790_000_000);
    }

    #[test]
    fn test_expired_at_or_past_exp() {
        let now = Utc::now();
        for offset in [-3600, -1, 0] {
            let token = token_with_claims(serde_json::json!({
                "sub": "1",
                "exp": (now + Duration::seconds(offset)).timestamp(),
            }));
            assert!(
                is_expired_at(&token, HARD_EXPIRY_LEEWAY_SECS, now),
                "offset {offset} should be expired"
            );
        }
    }

    #[test]
    fn test_not_expired_before_exp() {
        let now = Utc::now();
        let token = token_with_claims(serde_json::json!({
            "sub": "1",
            "exp": (now + Duration::seconds(1)).timestamp(),
        }));
        assert!(!is_expired_at(&token, HARD_EXPIRY_LEEWAY_SECS, now));
    }

    #[test]
    fn test_expiring_soon_leeway() {
        let now = Utc::now();
        let soon = token_with_claims(serde_json::json!({
            "sub": "1",
            "exp": (now + Duration::seconds(299)).timestamp(),
        }));
        let later = token_with_claims(serde_json::json!({
            "sub": "1",
            "exp": (now + Duration::seconds(301)).timestamp(),
        }));

        assert!(is_expired_at(&soon, EXPIRING_SOON_LEEWAY_SECS, now));
        assert!(!is_expired_at(&soon, HARD_EXPIRY_LEEWAY_SECS, now));
        assert!(!is_expired_at(&later, EXPIRING_SOON_LEEWAY_SECS, now));
    }

    #[test]
    fn test_garbage_counts_as_expired() {
        assert!(is_expired("garbage", 0));
        assert!(is_expired("", 0));
        assert!(!is_expired(&token_with_exp(3600), 0));
    }
}
