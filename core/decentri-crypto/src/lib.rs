//! Cryptographic primitives for DecentriLicense.
//!
//! This crate provides:
//! - Public key parsing and signature verification for every key family a
//!   token may declare (Ed25519 always, RSA and SM2 behind features)
//! - Signing key pairs for issuance tooling and device binding
//! - SHA-256 digests and PEM normalization used by canonical encoding
//! - Transit encryption of exported tokens (ChaCha20-Poly1305)
//!
//! # Security Model
//!
//! Signatures are the only trust mechanism. Transit encryption keeps token
//! contents private while they move between devices, but a decrypted token
//! is never trusted until its signature chain verifies.

mod algorithm;
mod device_key;
mod encoding;
mod error;
mod keys;
mod transit;

pub use algorithm::KeyAlgorithm;
pub use device_key::{DeviceKeyPair, verify_device_signature, DEVICE_SEED_SIZE};
pub use encoding::{b64_decode, b64_encode, normalize_pem, sha256, sha256_hex};
pub use error::{CryptoError, CryptoResult};
pub use keys::{PublicKey, SigningKeyPair};
pub use transit::{
    is_transit_format, open, open_string, seal, EncryptedBlob, TransitKey, KEY_SIZE, NONCE_SIZE,
    TAG_SIZE,
};

#[cfg(feature = "rsa")]
pub use keys::RSA_DEFAULT_BITS;

#[cfg(feature = "sm2")]
pub use keys::SM2_DISTID;
