//! Transit encryption for exported tokens using ChaCha20-Poly1305.
//!
//! The key is derived from the product public key, so any holder of the trust
//! anchor can read an exported blob. This keeps token contents off the wire
//! in clear text; it is not an integrity mechanism for the license itself.
//!
//! Wire format: `base64url(ciphertext || tag) "|" base64url(nonce)`.

use crate::encoding::{normalize_pem, sha256};
use crate::error::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of transit keys in bytes (256 bits for ChaCha20).
pub const KEY_SIZE: usize = 32;

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const SEPARATOR: char = '|';
const KEY_DOMAIN: &[u8] = b"decentrilicense/transit-key/v1\n";

/// A symmetric transit key with automatic zeroization on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TransitKey {
    bytes: [u8; KEY_SIZE],
}

impl TransitKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Derives the transit key shared by every holder of a product key.
    #[must_use]
    pub fn derive_from_anchor(product_public_key_pem: &str) -> Self {
        let mut material = KEY_DOMAIN.to_vec();
        material.extend_from_slice(normalize_pem(product_public_key_pem).as_bytes());
        Self {
            bytes: sha256(&material),
        }
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for TransitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypted data with the nonce needed for decryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// The nonce used for encryption (unique per encryption).
    pub nonce: [u8; NONCE_SIZE],
    /// The encrypted ciphertext (includes auth tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Encodes to the `ciphertext|nonce` wire form.
    #[must_use]
    pub fn to_wire(&self) -> String {
        format!(
            "{}{SEPARATOR}{}",
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
            URL_SAFE_NO_PAD.encode(self.nonce)
        )
    }

    /// Decodes from the `ciphertext|nonce` wire form.
    pub fn from_wire(encoded: &str) -> CryptoResult<Self> {
        let (ct, nonce) = encoded
            .trim()
            .split_once(SEPARATOR)
            .ok_or_else(|| CryptoError::Encoding("missing nonce separator".to_string()))?;

        let ciphertext = URL_SAFE_NO_PAD
            .decode(ct)
            .map_err(|e| CryptoError::Encoding(format!("invalid ciphertext base64: {e}")))?;
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(nonce)
            .map_err(|e| CryptoError::Encoding(format!("invalid nonce base64: {e}")))?;

        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::Decryption("data too short".to_string()));
        }
        let nonce: [u8; NONCE_SIZE] = nonce_bytes.as_slice().try_into().map_err(|_| {
            CryptoError::Encoding(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                nonce_bytes.len()
            ))
        })?;

        Ok(Self { nonce, ciphertext })
    }
}

/// Returns true if `input` has the shape of a transit blob.
///
/// JSON tokens start with `{`; the wire form holds exactly one separator.
#[must_use]
pub fn is_transit_format(input: &str) -> bool {
    let input = input.trim();
    !input.starts_with('{') && input.matches(SEPARATOR).count() == 1
}

/// Encrypts `plaintext` and returns the wire form.
pub fn seal(key: &TransitKey, plaintext: &[u8]) -> CryptoResult<String> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedBlob {
        nonce: nonce_bytes,
        ciphertext,
    }
    .to_wire())
}

/// Decrypts a wire-form blob.
pub fn open(key: &TransitKey, wire: &str) -> CryptoResult<Vec<u8>> {
    let blob = EncryptedBlob::from_wire(wire)?;
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&blob.nonce);

    cipher
        .decrypt(nonce, blob.ciphertext.as_ref())
        .map_err(|_| {
            CryptoError::Decryption("decryption failed (wrong key or tampered data)".to_string())
        })
}

/// Decrypts a wire-form blob holding UTF-8 text.
pub fn open_string(key: &TransitKey, wire: &str) -> CryptoResult<String> {
    let plaintext = open(key, wire)?;
    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::Decryption(format!("invalid UTF-8: {e}")))
}
