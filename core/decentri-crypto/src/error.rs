//! Error types for the crypto layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key family is unknown or was not compiled into this build.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A public or private key could not be decoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signature bytes are malformed or do not verify.
    #[error("signature verification failed")]
    InvalidSignature,

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key or tampered data).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Base64 or other text encoding error.
    #[error("encoding error: {0}")]
    Encoding(String),
}
