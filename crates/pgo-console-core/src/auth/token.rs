//! Offline inspection of access tokens.
//!
//! Tokens are opaque to the console except for the `exp` claim of a
//! `header.payload.signature` token. Anything that cannot be decoded counts
//! as expired.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};

/// Expiry instant claimed by the token, if it carries one.
pub fn expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (_header, payload) = (parts.next()?, parts.next()?);

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;

    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_f64()?;
    if !exp.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((exp * 1000.0) as i64)
}

/// A token is expired when its expiry is not strictly after `now`.
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match expiry(token) {
        Some(exp) => now >= exp,
        None => true,
    }
}

pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

#[cfg(test)]
pub(crate) fn encode_claims(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.{}", header, payload, URL_SAFE_NO_PAD.encode("sig"))
}

/// A token expiring `seconds` from now (negative for already expired).
#[cfg(test)]
pub(crate) fn token_expiring_in(seconds: i64) -> String {
    encode_claims(&serde_json::json!({
        "sub": "test",
        "exp": Utc::now().timestamp() + seconds,
    }))
}
