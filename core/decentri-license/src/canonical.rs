//! Canonical byte encodings for everything that is signed or hashed.
//!
//! Every statement is the compact JSON of a dedicated struct, so field order
//! is fixed by declaration. Each starts with a `domain` tag naming its
//! purpose and version, which keeps a signature over one statement from
//! being replayed as another. PEM keys are normalized before inclusion and
//! JSON objects inside `params` are rebuilt with sorted keys.

use crate::error::LicenseResult;
use crate::token::{Token, UsageChainEntry};
use decentri_crypto::{normalize_pem, sha256_hex, KeyAlgorithm};
use decentri_types::TokenId;
use serde::Serialize;
use serde_json::{Map, Value};

pub(crate) const PRODUCT_KEY_DOMAIN: &str = "decentrilicense/product-key/v1";
pub(crate) const LICENSE_KEY_DOMAIN: &str = "decentrilicense/license-key/v1";
pub(crate) const TOKEN_DOMAIN: &str = "decentrilicense/token/v1";
pub(crate) const USAGE_DOMAIN: &str = "decentrilicense/usage/v1";
pub(crate) const STATE_DOMAIN: &str = "decentrilicense/state/v1";
pub(crate) const GENESIS_DOMAIN: &str = "decentrilicense/ledger-genesis/v1";

#[derive(Serialize)]
struct ProductKeyStatement<'a> {
    domain: &'static str,
    product_public_key: &'a str,
}

#[derive(Serialize)]
struct LicenseKeyStatement<'a> {
    domain: &'static str,
    alg: KeyAlgorithm,
    app_id: &'a str,
    license_code: &'a str,
    license_public_key: &'a str,
}

#[derive(Serialize)]
struct TokenStatement<'a> {
    domain: &'static str,
    token_id: &'a TokenId,
    app_id: &'a str,
    license_code: &'a str,
    issue_time: i64,
    expire_time: i64,
    alg: KeyAlgorithm,
    license_public_key: &'a str,
    root_signature: &'a str,
    environment_hash: &'a str,
}

#[derive(Serialize)]
struct UsageStatement<'a> {
    domain: &'static str,
    token_id: &'a TokenId,
    seq: u64,
    time: i64,
    action: &'a str,
    params: Value,
    hash_prev: &'a str,
}

#[derive(Serialize)]
struct EntryDigest<'a> {
    seq: u64,
    time: i64,
    action: &'a str,
    params: Value,
    hash_prev: &'a str,
    signature: &'a str,
}

#[derive(Serialize)]
struct StateStatement<'a> {
    domain: &'static str,
    token_id: &'a TokenId,
    holder_device_id: &'a str,
    state_index: u64,
    ledger_head: &'a str,
}

/// Rebuilds a JSON value with object keys inserted in sorted order, so the
/// encoding does not depend on how `serde_json` orders maps.
pub(crate) fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn sorted_map(params: &Map<String, Value>) -> Value {
    sorted(&Value::Object(params.clone()))
}

/// Statement the root authority signs to certify a product key.
pub fn product_key_statement(product_public_key_pem: &str) -> LicenseResult<Vec<u8>> {
    let pem = normalize_pem(product_public_key_pem);
    Ok(serde_json::to_vec(&ProductKeyStatement {
        domain: PRODUCT_KEY_DOMAIN,
        product_public_key: &pem,
    })?)
}

/// Statement the product key signs to certify a license key (`root_signature`).
pub fn license_key_statement(
    alg: KeyAlgorithm,
    app_id: &str,
    license_code: &str,
    license_public_key_pem: &str,
) -> LicenseResult<Vec<u8>> {
    let pem = normalize_pem(license_public_key_pem);
    Ok(serde_json::to_vec(&LicenseKeyStatement {
        domain: LICENSE_KEY_DOMAIN,
        alg,
        app_id,
        license_code,
        license_public_key: &pem,
    })?)
}

/// Statement the license key signs (`signature`). Binding and ledger fields
/// are excluded so the token can be amended without re-issuing.
pub fn token_statement(token: &Token) -> LicenseResult<Vec<u8>> {
    let pem = normalize_pem(token.license_public_key());
    Ok(serde_json::to_vec(&TokenStatement {
        domain: TOKEN_DOMAIN,
        token_id: token.token_id(),
        app_id: token.app_id(),
        license_code: token.license_code(),
        issue_time: token.issue_time(),
        expire_time: token.expire_time(),
        alg: token.alg(),
        license_public_key: &pem,
        root_signature: token.root_signature(),
        environment_hash: token.environment_hash().unwrap_or(""),
    })?)
}

/// Statement a device signs for one ledger entry.
pub fn usage_statement(
    token_id: &TokenId,
    seq: u64,
    time: i64,
    action: &str,
    params: &Map<String, Value>,
    hash_prev: &str,
) -> LicenseResult<Vec<u8>> {
    Ok(serde_json::to_vec(&UsageStatement {
        domain: USAGE_DOMAIN,
        token_id,
        seq,
        time,
        action,
        params: sorted_map(params),
        hash_prev,
    })?)
}

/// Statement the holder signs over the ledger head (`state_signature`).
pub fn state_statement(
    token_id: &TokenId,
    holder_device_id: &str,
    state_index: u64,
    ledger_head: &str,
) -> LicenseResult<Vec<u8>> {
    Ok(serde_json::to_vec(&StateStatement {
        domain: STATE_DOMAIN,
        token_id,
        holder_device_id,
        state_index,
        ledger_head,
    })?)
}

/// `hash_prev` of the first ledger entry of a token.
#[must_use]
pub fn genesis_hash(token_id: &TokenId) -> String {
    sha256_hex(format!("{GENESIS_DOMAIN}\n{token_id}").as_bytes())
}

/// Hash of a complete entry, signature included.
pub fn entry_hash(entry: &UsageChainEntry) -> LicenseResult<String> {
    let bytes = serde_json::to_vec(&EntryDigest {
        seq: entry.seq,
        time: entry.time,
        action: &entry.action,
        params: sorted_map(&entry.params),
        hash_prev: &entry.hash_prev,
        signature: &entry.signature,
    })?;
    Ok(sha256_hex(&bytes))
}
