//! Public keys and signing key pairs for every supported key family.
//!
//! Public keys travel as SPKI PEM. Ed25519 signs the message directly, RSA
//! uses PKCS#1 v1.5 over SHA-256 and SM2 uses SM3 with the standard
//! distinguishing id.

use crate::algorithm::KeyAlgorithm;
use crate::encoding::normalize_pem;
use crate::error::{CryptoError, CryptoResult};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use rand::rngs::OsRng;
use std::fmt;

/// Default modulus size for generated RSA keys.
#[cfg(feature = "rsa")]
pub const RSA_DEFAULT_BITS: usize = 2048;

/// Distinguishing id used for SM2 signatures (GM/T 0009 default).
#[cfg(feature = "sm2")]
pub const SM2_DISTID: &str = "1234567812345678";

fn unsupported(alg: KeyAlgorithm) -> CryptoError {
    CryptoError::UnsupportedAlgorithm(alg.to_string())
}

/// A public key of any supported family.
#[derive(Clone)]
pub enum PublicKey {
    Ed25519(ed25519_dalek::VerifyingKey),
    #[cfg(feature = "rsa")]
    Rsa(Box<rsa::RsaPublicKey>),
    #[cfg(feature = "sm2")]
    Sm2(sm2::PublicKey),
}

impl PublicKey {
    /// Parses an SPKI PEM public key of the given family.
    pub fn from_pem(alg: KeyAlgorithm, pem: &str) -> CryptoResult<Self> {
        if !alg.is_available() {
            return Err(unsupported(alg));
        }
        let pem = normalize_pem(pem);
        match alg {
            KeyAlgorithm::Ed25519 => {
                <ed25519_dalek::VerifyingKey as ed25519_dalek::pkcs8::DecodePublicKey>::from_public_key_pem(&pem)
                    .map(Self::Ed25519)
                    .map_err(|e| CryptoError::InvalidKey(format!("Ed25519 public key: {e}")))
            }
            #[cfg(feature = "rsa")]
            KeyAlgorithm::Rsa => {
                <rsa::RsaPublicKey as rsa::pkcs8::DecodePublicKey>::from_public_key_pem(&pem)
                    .map(|key| Self::Rsa(Box::new(key)))
                    .map_err(|e| CryptoError::InvalidKey(format!("RSA public key: {e}")))
            }
            #[cfg(feature = "sm2")]
            KeyAlgorithm::Sm2 => {
                <sm2::PublicKey as sm2::pkcs8::DecodePublicKey>::from_public_key_pem(&pem)
                    .map(Self::Sm2)
                    .map_err(|e| CryptoError::InvalidKey(format!("SM2 public key: {e}")))
            }
            #[allow(unreachable_patterns)]
            _ => Err(unsupported(alg)),
        }
    }

    /// Parses a PEM public key whose family is not declared alongside it.
    ///
    /// Each available family is tried in `KeyAlgorithm::ALL` order; the SPKI
    /// algorithm identifier makes at most one of them succeed.
    pub fn from_pem_any(pem: &str) -> CryptoResult<Self> {
        KeyAlgorithm::ALL
            .into_iter()
            .filter(|alg| alg.is_available())
            .find_map(|alg| Self::from_pem(alg, pem).ok())
            .ok_or_else(|| {
                CryptoError::InvalidKey("not a public key of any supported family".to_string())
            })
    }

    /// Returns the key family.
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::Ed25519(_) => KeyAlgorithm::Ed25519,
            #[cfg(feature = "rsa")]
            Self::Rsa(_) => KeyAlgorithm::Rsa,
            #[cfg(feature = "sm2")]
            Self::Sm2(_) => KeyAlgorithm::Sm2,
        }
    }

    /// Encodes the key as normalized SPKI PEM.
    pub fn to_pem(&self) -> CryptoResult<String> {
        let pem = match self {
            Self::Ed25519(key) => {
                <ed25519_dalek::VerifyingKey as ed25519_dalek::pkcs8::EncodePublicKey>::to_public_key_pem(key, LineEnding::LF)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            }
            #[cfg(feature = "rsa")]
            Self::Rsa(key) => {
                <rsa::RsaPublicKey as rsa::pkcs8::EncodePublicKey>::to_public_key_pem(key, rsa::pkcs8::LineEnding::LF)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            }
            #[cfg(feature = "sm2")]
            Self::Sm2(key) => {
                <sm2::PublicKey as sm2::pkcs8::EncodePublicKey>::to_public_key_pem(key, sm2::pkcs8::LineEnding::LF)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            }
        };
        Ok(normalize_pem(&pem))
    }

    /// Verifies `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> CryptoResult<()> {
        match self {
            Self::Ed25519(key) => {
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| CryptoError::InvalidSignature)?;
                key.verify_strict(message, &sig)
                    .map_err(|_| CryptoError::InvalidSignature)
            }
            #[cfg(feature = "rsa")]
            Self::Rsa(key) => {
                let verifier =
                    rsa::pkcs1v15::VerifyingKey::<rsa::sha2::Sha256>::new(key.as_ref().clone());
                let sig = rsa::pkcs1v15::Signature::try_from(signature)
                    .map_err(|_| CryptoError::InvalidSignature)?;
                rsa::signature::Verifier::verify(&verifier, message, &sig)
                    .map_err(|_| CryptoError::InvalidSignature)
            }
            #[cfg(feature = "sm2")]
            Self::Sm2(key) => {
                let verifier = sm2::dsa::VerifyingKey::new(SM2_DISTID, key.clone())
                    .map_err(|e| CryptoError::InvalidKey(format!("SM2 public key: {e}")))?;
                let sig = sm2::dsa::Signature::try_from(signature)
                    .map_err(|_| CryptoError::InvalidSignature)?;
                sm2::dsa::signature::Verifier::verify(&verifier, message, &sig)
                    .map_err(|_| CryptoError::InvalidSignature)
            }
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

/// A private signing key of any supported family.
///
/// Used by issuance tooling (root, product and license keys). Device binding
/// uses the narrower `DeviceKeyPair`.
pub enum SigningKeyPair {
    Ed25519(ed25519_dalek::SigningKey),
    #[cfg(feature = "rsa")]
    Rsa(Box<rsa::RsaPrivateKey>),
    #[cfg(feature = "sm2")]
    Sm2(sm2::SecretKey),
}

impl SigningKeyPair {
    /// Generates a fresh key pair of the given family.
    pub fn generate(alg: KeyAlgorithm) -> CryptoResult<Self> {
        match alg {
            KeyAlgorithm::Ed25519 => Ok(Self::Ed25519(ed25519_dalek::SigningKey::generate(
                &mut OsRng,
            ))),
            #[cfg(feature = "rsa")]
            KeyAlgorithm::Rsa => Self::generate_rsa(RSA_DEFAULT_BITS),
            #[cfg(feature = "sm2")]
            KeyAlgorithm::Sm2 => Ok(Self::Sm2(sm2::SecretKey::random(&mut OsRng))),
            #[allow(unreachable_patterns)]
            _ => Err(unsupported(alg)),
        }
    }

    /// Creates a deterministic Ed25519 key pair from a 32-byte seed.
    #[must_use]
    pub fn ed25519_from_seed(seed: &[u8; 32]) -> Self {
        Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(seed))
    }

    /// Generates an RSA key pair with a specific modulus size.
    #[cfg(feature = "rsa")]
    pub fn generate_rsa(bits: usize) -> CryptoResult<Self> {
        rsa::RsaPrivateKey::new(&mut OsRng, bits)
            .map(|key| Self::Rsa(Box::new(key)))
            .map_err(|e| CryptoError::InvalidKey(format!("RSA key generation: {e}")))
    }

    /// Returns the key family.
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::Ed25519(_) => KeyAlgorithm::Ed25519,
            #[cfg(feature = "rsa")]
            Self::Rsa(_) => KeyAlgorithm::Rsa,
            #[cfg(feature = "sm2")]
            Self::Sm2(_) => KeyAlgorithm::Sm2,
        }
    }

    /// Returns the public half.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
            #[cfg(feature = "rsa")]
            Self::Rsa(key) => PublicKey::Rsa(Box::new(key.to_public_key())),
            #[cfg(feature = "sm2")]
            Self::Sm2(key) => PublicKey::Sm2(key.public_key()),
        }
    }

    /// Returns the public half as normalized SPKI PEM.
    pub fn public_key_pem(&self) -> CryptoResult<String> {
        self.public_key().to_pem()
    }

    /// Signs `message`, returning the raw signature bytes.
    pub fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
        match self {
            Self::Ed25519(key) => {
                let sig = ed25519_dalek::Signer::sign(key, message);
                Ok(sig.to_bytes().to_vec())
            }
            #[cfg(feature = "rsa")]
            Self::Rsa(key) => {
                let signer =
                    rsa::pkcs1v15::SigningKey::<rsa::sha2::Sha256>::new(key.as_ref().clone());
                let sig: rsa::pkcs1v15::Signature =
                    rsa::signature::Signer::try_sign(&signer, message)
                        .map_err(|e| CryptoError::Signing(e.to_string()))?;
                Ok(rsa::signature::SignatureEncoding::to_vec(&sig))
            }
            #[cfg(feature = "sm2")]
            Self::Sm2(key) => {
                let signer = sm2::dsa::SigningKey::new(SM2_DISTID, key)
                    .map_err(|e| CryptoError::InvalidKey(format!("SM2 secret key: {e}")))?;
                let sig: sm2::dsa::Signature =
                    sm2::dsa::signature::Signer::try_sign(&signer, message)
                        .map_err(|e| CryptoError::Signing(e.to_string()))?;
                Ok(sig.to_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("algorithm", &self.algorithm())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
