//! Device binding keys.
//!
//! Every device owns an Ed25519 key. Its raw public key is published in the
//! ledger's activation entry and every later entry is signed with it.

use crate::encoding::{b64_decode, b64_encode};
use crate::error::{CryptoError, CryptoResult};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroizing;

/// Size of a device key seed in bytes.
pub const DEVICE_SEED_SIZE: usize = 32;

/// An Ed25519 device key pair. The secret is zeroized on drop.
#[derive(Clone)]
pub struct DeviceKeyPair {
    key: SigningKey,
}

impl DeviceKeyPair {
    /// Generates a random device key.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restores a device key from its seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; DEVICE_SEED_SIZE]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }

    /// Restores a device key from a seed slice of unchecked length.
    pub fn from_seed_slice(seed: &[u8]) -> CryptoResult<Self> {
        let seed: [u8; DEVICE_SEED_SIZE] =
            seed.try_into()
                .map_err(|_| CryptoError::InvalidKey(format!(
                    "device seed must be {DEVICE_SEED_SIZE} bytes, got {}",
                    seed.len()
                )))?;
        Ok(Self::from_seed(&seed))
    }

    /// Returns the secret seed for persistence.
    #[must_use]
    pub fn seed(&self) -> Zeroizing<[u8; DEVICE_SEED_SIZE]> {
        Zeroizing::new(self.key.to_bytes())
    }

    /// Returns the raw public key, base64 encoded.
    #[must_use]
    pub fn public_key_b64(&self) -> String {
        b64_encode(self.key.verifying_key().as_bytes())
    }

    /// Signs `message` and returns the base64 signature.
    #[must_use]
    pub fn sign_b64(&self, message: &[u8]) -> String {
        b64_encode(&self.key.sign(message).to_bytes())
    }
}

impl fmt::Debug for DeviceKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceKeyPair")
            .field("public", &self.public_key_b64())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Verifies a base64 signature against a base64 raw Ed25519 public key.
pub fn verify_device_signature(
    public_key_b64: &str,
    message: &[u8],
    signature_b64: &str,
) -> CryptoResult<()> {
    let key_bytes: [u8; 32] = b64_decode(public_key_b64)?
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("device public key must be 32 bytes".to_string()))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::InvalidKey(format!("device public key: {e}")))?;
    let sig = ed25519_dalek::Signature::from_slice(&b64_decode(signature_b64)?)
        .map_err(|_| CryptoError::InvalidSignature)?;
    key.verify_strict(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}
