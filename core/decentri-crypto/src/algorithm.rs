//! Key families a token may declare.

use crate::error::CryptoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signature algorithm family of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    #[serde(rename = "Ed25519")]
    Ed25519,
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "SM2")]
    Sm2,
}

impl KeyAlgorithm {
    /// Every family, in preference order for key auto-detection.
    pub const ALL: [KeyAlgorithm; 3] = [Self::Ed25519, Self::Rsa, Self::Sm2];

    /// Returns the wire name (`Ed25519`, `RSA`, `SM2`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ed25519 => "Ed25519",
            Self::Rsa => "RSA",
            Self::Sm2 => "SM2",
        }
    }

    /// Returns true if this build can verify signatures of this family.
    #[must_use]
    pub const fn is_available(self) -> bool {
        match self {
            Self::Ed25519 => true,
            Self::Rsa => cfg!(feature = "rsa"),
            Self::Sm2 => cfg!(feature = "sm2"),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = CryptoError;

    /// Parses a family name case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ed25519" => Ok(Self::Ed25519),
            "rsa" => Ok(Self::Rsa),
            "sm2" => Ok(Self::Sm2),
            _ => Err(CryptoError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}
