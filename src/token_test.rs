use super::*;

fn payload_token(claims: &str) -> String {
    format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(claims))
}

// =============================================================================
// expires_at
// =============================================================================

#[test]
fn reads_integer_exp() {
    let token = unsigned_token("u-1", 1_700_000_000, "n1");
    assert_eq!(expires_at(&token), Some(1_700_000_000));
}

#[test]
fn reads_float_exp() {
    assert_eq!(expires_at(&payload_token(r#"{"exp": 1700000000.75}"#)), Some(1_700_000_000));
}

#[test]
fn tolerates_padded_payload() {
    let padded = format!("e30.{}==.sig", URL_SAFE_NO_PAD.encode(r#"{"exp":42}"#));
    assert_eq!(expires_at(&padded), Some(42));
}

#[test]
fn missing_exp_is_none() {
    assert_eq!(expires_at(&payload_token(r#"{"sub":"u-1"}"#)), None);
}

#[test]
fn opaque_token_is_none() {
    assert_eq!(expires_at("3f9a0c1d2e"), None);
    assert_eq!(expires_at(""), None);
}

#[test]
fn too_many_segments_is_none() {
    assert_eq!(expires_at("a.b.c.d"), None);
}

#[test]
fn garbage_payload_is_none() {
    assert_eq!(expires_at("e30.!!!.sig"), None);
    assert_eq!(expires_at(&payload_token("not json")), None);
}

// =============================================================================
// is_expired_at
// =============================================================================

#[test]
fn future_token_is_valid() {
    let token = unsigned_token("u-1", 1_000, "n");
    assert!(!is_expired_at(&token, 500, 60));
}

#[test]
fn past_token_is_expired() {
    let token = unsigned_token("u-1", 1_000, "n");
    assert!(is_expired_at(&token, 1_001, 0));
}

#[test]
fn token_inside_leeway_counts_as_expired() {
    let token = unsigned_token("u-1", 1_000, "n");
    assert!(is_expired_at(&token, 950, 60));
    assert!(!is_expired_at(&token, 900, 60));
}

#[test]
fn exp_equal_to_now_is_expired() {
    let token = unsigned_token("u-1", 1_000, "n");
    assert!(is_expired_at(&token, 1_000, 0));
}

#[test]
fn unreadable_token_counts_as_expired() {
    assert!(is_expired_at("opaque", 0, 0));
}

#[test]
fn is_expired_uses_wall_clock() {
    let fresh = unsigned_token("u-1", now_unix() + 3_600, "n");
    let stale = unsigned_token("u-1", now_unix() - 10, "n");
    assert!(!is_expired(&fresh, 60));
    assert!(is_expired(&stale, 0));
}

#[test]
fn unsigned_tokens_with_different_nonces_differ() {
    assert_ne!(unsigned_token("u", 1, "a"), unsigned_token("u", 1, "b"));
}
