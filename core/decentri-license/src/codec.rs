//! Token import and export.
//!
//! Exports are transit blobs (see `decentri_crypto::seal`) keyed by the trust
//! anchor. Import accepts either a blob or a plain JSON token and never
//! trusts what it reads; callers verify afterwards.

use crate::anchor::TrustAnchor;
use crate::error::{LicenseError, LicenseResult};
use crate::token::Token;
use decentri_crypto::{is_transit_format, open_string, seal};
use tracing::debug;

/// Encrypts `token` for transfer to another holder of `anchor`.
pub fn export_encrypted(token: &Token, anchor: &TrustAnchor) -> LicenseResult<String> {
    let json = token.to_json()?;
    Ok(seal(anchor.transit_key(), json.as_bytes())?)
}

/// Reads a token from a transit blob or plain JSON.
///
/// Decryption is tried first when an anchor is available. If it fails the
/// input is parsed as plain JSON. Input that is neither yields
/// `UnreadableToken`; JSON that parses but is not a valid token keeps its
/// `MalformedToken` or `UnsupportedAlgorithm` error.
pub fn import(input: &str, anchor: Option<&TrustAnchor>) -> LicenseResult<Token> {
    let input = input.trim();
    if input.is_empty() {
        return Err(LicenseError::InvalidArgument("token input is empty".to_string()));
    }

    if is_transit_format(input) {
        match anchor {
            Some(anchor) => match open_string(anchor.transit_key(), input) {
                Ok(json) => {
                    debug!("decrypted transit token");
                    return Token::from_json(&json);
                }
                Err(e) => debug!(error = %e, "transit decryption failed, trying plain JSON"),
            },
            None => debug!("encrypted token input without a trust anchor"),
        }
    }

    if input.starts_with('{') {
        return Token::from_json(input);
    }

    Err(LicenseError::UnreadableToken(if anchor.is_some() {
        "input is neither a blob for this trust anchor nor a JSON token".to_string()
    } else {
        "input is not a JSON token and no trust anchor is set to decrypt it".to_string()
    }))
}
