mod common;

use common::{fixture, APP_ID, LICENSE_CODE, NOW};
use decentri_license::{ErrorKind, KeyAlgorithm, LicenseError, Token};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn token_value() -> Value {
    serde_json::from_str(&fixture().token().to_json().unwrap()).unwrap()
}

// ── Parsing ──

#[test]
fn issued_token_fields() {
    let f = fixture();
    let token = f.token();
    assert_eq!(token.app_id(), APP_ID);
    assert_eq!(token.license_code(), LICENSE_CODE);
    assert_eq!(token.alg(), KeyAlgorithm::Ed25519);
    assert_eq!(token.issue_time(), NOW);
    assert_eq!(token.expire_time(), 0);
    assert!(!token.is_bound());
    assert!(token.usage_chain().is_empty());
    assert_eq!(token.last_seq(), None);
}

#[test]
fn json_roundtrip_preserves_token() {
    let token = fixture().token();
    let parsed = Token::from_json(&token.to_json().unwrap()).unwrap();
    assert_eq!(parsed, token);

    let pretty = Token::from_json(&token.to_json_pretty().unwrap()).unwrap();
    assert_eq!(pretty, token);
}

#[test]
fn serialization_is_deterministic() {
    let token = fixture().token();
    assert_eq!(token.to_json().unwrap(), token.to_json().unwrap());
}

#[test]
fn unbound_token_serializes_empty_holder() {
    let value = token_value();
    assert_eq!(value["holder_device_id"], json!(""));
    assert_eq!(value["usage_chain"], json!([]));
    assert_eq!(value["alg"], json!("Ed25519"));
}

#[test]
fn missing_required_field_is_malformed() {
    for field in [
        "token_id",
        "app_id",
        "license_code",
        "alg",
        "issue_time",
        "expire_time",
        "license_public_key",
        "root_signature",
        "signature",
    ] {
        let mut value = token_value();
        value.as_object_mut().unwrap().remove(field);
        let err = Token::from_json(&value.to_string()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedToken, "field {field}");
        assert!(err.to_string().contains(field), "field {field}: {err}");
    }
}

#[test]
fn mistyped_field_is_malformed() {
    let mut value = token_value();
    value["issue_time"] = json!("yesterday");
    let err = Token::from_json(&value.to_string()).unwrap_err();
    assert!(matches!(err, LicenseError::MalformedToken(_)));
}

#[test]
fn empty_signature_is_malformed() {
    let mut value = token_value();
    value["signature"] = json!("");
    let err = Token::from_json(&value.to_string()).unwrap_err();
    assert!(matches!(err, LicenseError::MalformedToken(_)));
}

#[test]
fn negative_expiry_is_malformed() {
    let mut value = token_value();
    value["expire_time"] = json!(-5);
    assert!(Token::from_json(&value.to_string()).is_err());
}

#[test]
fn unknown_algorithm_is_unsupported() {
    let mut value = token_value();
    value["alg"] = json!("DSA");
    let err = Token::from_json(&value.to_string()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
}

#[test]
fn algorithm_names_are_case_insensitive() {
    let mut value = token_value();
    value["alg"] = json!("ed25519");
    let token = Token::from_json(&value.to_string()).unwrap();
    assert_eq!(token.alg(), KeyAlgorithm::Ed25519);
}

#[cfg(not(feature = "sm2"))]
#[test]
fn sm2_token_rejected_without_feature() {
    let mut value = token_value();
    value["alg"] = json!("SM2");
    let err = Token::from_json(&value.to_string()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
}

#[test]
fn not_json_is_malformed() {
    let err = Token::from_json("token please").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedToken);
}

#[test]
fn optional_ledger_fields_default() {
    let mut value = token_value();
    let obj = value.as_object_mut().unwrap();
    for field in [
        "holder_device_id",
        "usage_chain",
        "state_index",
        "ledger_head",
        "state_signature",
        "environment_hash",
    ] {
        obj.remove(field);
    }
    let token = Token::from_json(&value.to_string()).unwrap();
    assert!(!token.is_bound());
    assert_eq!(token.state_index(), 0);
    assert_eq!(token.environment_hash(), None);
}

// ── Expiry ──

#[test]
fn zero_expiry_never_expires() {
    let token = fixture().token();
    assert!(!token.is_expired_at(i64::MAX));
}

#[test]
fn expiry_is_strictly_after() {
    let token = fixture().token_expiring(NOW + 10);
    assert!(!token.is_expired_at(NOW + 10));
    assert!(token.is_expired_at(NOW + 11));
}
