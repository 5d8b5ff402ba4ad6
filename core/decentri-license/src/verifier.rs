//! Offline trust chain verification.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. `license_public_key` decodes for the declared `alg`
//! 2. `root_signature` verifies under the anchor over the license key statement
//! 3. `signature` verifies under the license key over the token statement
//! 4. the token has not expired
//! 5. the embedded ledger replays
//!
//! Verification is pure: no I/O and no clock reads beyond the `now` argument.

use crate::anchor::TrustAnchor;
use crate::canonical::{license_key_statement, token_statement};
use crate::chain::ChainLink;
use crate::error::{ErrorKind, LicenseError, LicenseResult};
use crate::ledger::{replay, LedgerState};
use crate::token::Token;
use decentri_crypto::{b64_decode, CryptoError, PublicKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Structured verification result returned across the client surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub valid: bool,
    /// Human-readable failure, empty when valid.
    pub error_message: String,
    pub error: Option<ErrorKind>,
    /// The chain link that failed, when the failure is a link.
    pub failed_link: Option<ChainLink>,
}

impl VerificationOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn valid() -> Self {
        Self {
            valid: true,
            error_message: String::new(),
            error: None,
            failed_link: None,
        }
    }

    /// An outcome describing `err`.
    #[must_use]
    pub fn from_error(err: &LicenseError) -> Self {
        Self {
            valid: false,
            error_message: err.to_string(),
            error: Some(err.kind()),
            failed_link: failed_link(err),
        }
    }
}

fn failed_link(err: &LicenseError) -> Option<ChainLink> {
    match err {
        LicenseError::TrustChainBroken { link, .. } => Some(*link),
        LicenseError::LedgerTampered { seq, .. } => Some(ChainLink::LedgerEntry(*seq)),
        _ => None,
    }
}

/// A key of another family means `alg` names the wrong family; a key of no
/// family is a broken link.
fn license_key_error(token: &Token, err: CryptoError) -> LicenseError {
    if let CryptoError::UnsupportedAlgorithm(alg) = err {
        return LicenseError::UnsupportedAlgorithm(alg);
    }
    match PublicKey::from_pem_any(token.license_public_key()) {
        Ok(actual) => LicenseError::UnsupportedAlgorithm(format!(
            "token declares {} but its license key is {}",
            token.alg(),
            actual.algorithm()
        )),
        Err(_) => LicenseError::chain(ChainLink::LicenseKey, err.to_string()),
    }
}

fn decode_signature(link: ChainLink, encoded: &str) -> LicenseResult<Vec<u8>> {
    b64_decode(encoded).map_err(|e| LicenseError::chain(link, e.to_string()))
}

/// Verifies `token` against `anchor` at time `now`, returning the replayed
/// ledger on success.
pub fn verify_token(token: &Token, anchor: &TrustAnchor, now: i64) -> LicenseResult<LedgerState> {
    let license_key = PublicKey::from_pem(token.alg(), token.license_public_key())
        .map_err(|e| license_key_error(token, e))?;

    let root_signature = decode_signature(ChainLink::LicenseKey, token.root_signature())?;
    let statement = license_key_statement(
        token.alg(),
        token.app_id(),
        token.license_code(),
        token.license_public_key(),
    )?;
    anchor
        .public_key()
        .verify(&statement, &root_signature)
        .map_err(|_| LicenseError::chain(ChainLink::LicenseKey, "root signature does not verify under the trust anchor"))?;

    let signature = decode_signature(ChainLink::Token, token.signature())?;
    license_key
        .verify(&token_statement(token)?, &signature)
        .map_err(|_| LicenseError::chain(ChainLink::Token, "token signature does not verify under the license key"))?;

    if token.is_expired_at(now) {
        return Err(LicenseError::Expired {
            expire_time: token.expire_time(),
            now,
        });
    }

    replay(token)
}

/// Verifies `token` and reports the outcome as a value.
#[must_use]
pub fn verify(token: &Token, anchor: &TrustAnchor, now: i64) -> VerificationOutcome {
    match verify_token(token, anchor, now) {
        Ok(state) => {
            debug!(token_id = %token.token_id(), entries = state.next_seq, "token verified");
            VerificationOutcome::valid()
        }
        Err(err) => {
            warn!(token_id = %token.token_id(), error = %err, "token verification failed");
            VerificationOutcome::from_error(&err)
        }
    }
}
