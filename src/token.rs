//! Bearer token inspection.
//!
//! The session layer treats tokens as opaque except for the JWT `exp` claim,
//! which it reads (without verifying the signature) to decide when to refresh.
//! A token whose expiry cannot be read counts as expired.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

/// Current wall-clock time in Unix seconds.
#[must_use]
pub fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Read the `exp` claim (Unix seconds) from a JWT-shaped token.
///
/// Returns `None` for anything that is not `header.payload.signature` with a
/// base64url JSON payload carrying a numeric `exp`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn expires_at(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;
    exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))
}

/// Whether `token` is expired at `now`, or will be within `leeway_secs`.
#[must_use]
pub fn is_expired_at(token: &str, now: i64, leeway_secs: i64) -> bool {
    match expires_at(token) {
        Some(exp) => exp <= now.saturating_add(leeway_secs),
        None => true,
    }
}

/// [`is_expired_at`] against the current clock.
#[must_use]
pub fn is_expired(token: &str, leeway_secs: i64) -> bool {
    is_expired_at(token, now_unix(), leeway_secs)
}

/// Build an unsigned JWT-shaped token carrying `sub` and `exp`.
#[cfg(any(test, feature = "test-doubles"))]
#[must_use]
pub fn unsigned_token(subject: &str, exp: i64, nonce: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = serde_json::json!({ "sub": subject, "exp": exp, "jti": nonce });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}

#[cfg(test)]
#[path = "token_test.rs"]
mod tests;
