//! Error types for the licensing core.

use crate::chain::ChainLink;
use decentri_crypto::CryptoError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable classification of every failure a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidArgument,
    NotInitialized,
    AlreadyInitialized,
    MalformedToken,
    UnsupportedAlgorithm,
    TrustChainBroken,
    Expired,
    LedgerTampered,
    NotBound,
    SequenceConflict,
    ElectionAbandoned,
    NetworkError,
    CryptoError,
    UnreadableToken,
    StorageError,
}

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Required token fields are absent or mistyped.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// `alg` names no known key family, or one not compiled in.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A signature link of the trust chain does not hold.
    #[error("trust chain broken at {link}: {reason}")]
    TrustChainBroken { link: ChainLink, reason: String },

    /// The token's expiry time has passed.
    #[error("token expired at {expire_time} (now {now})")]
    Expired { expire_time: i64, now: i64 },

    /// The embedded usage ledger does not replay.
    #[error("ledger tampered at seq {seq}: {reason}")]
    LedgerTampered { seq: u64, reason: String },

    /// The operation needs a binding this device does not hold.
    #[error("not bound: {0}")]
    NotBound(String),

    /// The token is behind, or forked from, a ledger head already observed.
    #[error("sequence conflict at seq {observed}: {reason}")]
    SequenceConflict { observed: u64, reason: String },

    /// Input is neither a decryptable blob nor a plain token.
    #[error("unreadable token: {0}")]
    UnreadableToken(String),

    /// Caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Device key storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Cryptographic primitive failure outside a chain link.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// Returns the stable kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedToken(_) | Self::Serialization(_) => ErrorKind::MalformedToken,
            Self::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            Self::TrustChainBroken { .. } => ErrorKind::TrustChainBroken,
            Self::Expired { .. } => ErrorKind::Expired,
            Self::LedgerTampered { .. } => ErrorKind::LedgerTampered,
            Self::NotBound(_) => ErrorKind::NotBound,
            Self::SequenceConflict { .. } => ErrorKind::SequenceConflict,
            Self::UnreadableToken(_) => ErrorKind::UnreadableToken,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Storage(_) => ErrorKind::StorageError,
            Self::Crypto(CryptoError::UnsupportedAlgorithm(_)) => ErrorKind::UnsupportedAlgorithm,
            Self::Crypto(_) => ErrorKind::CryptoError,
        }
    }

    pub(crate) fn chain(link: ChainLink, reason: impl Into<String>) -> Self {
        Self::TrustChainBroken {
            link,
            reason: reason.into(),
        }
    }

    pub(crate) fn tampered(seq: u64, reason: impl Into<String>) -> Self {
        Self::LedgerTampered {
            seq,
            reason: reason.into(),
        }
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
