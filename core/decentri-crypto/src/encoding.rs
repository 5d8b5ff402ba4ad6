//! Digests and text encodings shared by canonical statements.

use crate::error::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

/// SHA-256 of `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Normalizes PEM text so the same key always hashes and signs identically.
///
/// Line endings become `\n`, surrounding whitespace is dropped from every
/// line, blank lines are removed and exactly one trailing newline is kept.
#[must_use]
pub fn normalize_pem(pem: &str) -> String {
    let mut out = String::with_capacity(pem.len() + 1);
    for line in pem.lines().map(str::trim).filter(|l| !l.is_empty()) {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Standard base64 with padding.
#[must_use]
pub fn b64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes standard base64, ignoring surrounding whitespace.
pub fn b64_decode(encoded: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::Encoding(format!("invalid base64: {e}")))
}
