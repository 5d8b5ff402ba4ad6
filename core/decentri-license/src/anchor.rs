//! The trust anchor: the product public key a session verifies against.
//!
//! # File Format
//!
//! ```text
//! -----BEGIN PUBLIC KEY-----
//! ...
//! -----END PUBLIC KEY-----
//! ROOT_SIGNATURE:<base64 signature of the root authority>
//! ```
//!
//! The `ROOT_SIGNATURE` line is optional. When a root public key is pinned it
//! must be present and verify over the product key statement.

use crate::canonical::product_key_statement;
use crate::chain::ChainLink;
use crate::error::{LicenseError, LicenseResult};
use decentri_crypto::{b64_decode, normalize_pem, KeyAlgorithm, PublicKey, TransitKey};
use tracing::debug;

const ROOT_SIGNATURE_PREFIX: &str = "ROOT_SIGNATURE:";

/// A parsed product public key, optionally certified by the root authority.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    pem: String,
    key: PublicKey,
    root_signature: Option<String>,
    transit: TransitKey,
}

impl TrustAnchor {
    /// Parses anchor file content without checking the root signature.
    pub fn parse(content: &str) -> LicenseResult<Self> {
        let mut pem_lines = Vec::new();
        let mut root_signature = None;
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(sig) = line.strip_prefix(ROOT_SIGNATURE_PREFIX) {
                root_signature = Some(sig.trim().to_string());
            } else {
                pem_lines.push(line);
            }
        }

        let pem = normalize_pem(&pem_lines.join("\n"));
        if !pem.starts_with("-----BEGIN") {
            return Err(LicenseError::InvalidArgument(
                "trust anchor is not a PEM public key".to_string(),
            ));
        }
        let key = PublicKey::from_pem_any(&pem)
            .map_err(|e| LicenseError::InvalidArgument(format!("trust anchor: {e}")))?;
        debug!(algorithm = %key.algorithm(), certified = root_signature.is_some(), "parsed trust anchor");

        Ok(Self {
            transit: TransitKey::derive_from_anchor(&pem),
            pem,
            key,
            root_signature,
        })
    }

    /// Parses anchor file content and checks it against a pinned root key.
    pub fn parse_pinned(content: &str, root_public_key_pem: &str) -> LicenseResult<Self> {
        let anchor = Self::parse(content)?;
        let root = PublicKey::from_pem_any(root_public_key_pem)
            .map_err(|e| LicenseError::InvalidArgument(format!("root public key: {e}")))?;
        anchor.verify_root(&root)?;
        Ok(anchor)
    }

    /// Checks the `ROOT_SIGNATURE` line against a root authority key.
    pub fn verify_root(&self, root: &PublicKey) -> LicenseResult<()> {
        let sig = self
            .root_signature
            .as_deref()
            .ok_or_else(|| LicenseError::chain(ChainLink::Product, "anchor carries no root signature"))?;
        let sig = b64_decode(sig)
            .map_err(|e| LicenseError::chain(ChainLink::Product, e.to_string()))?;
        root.verify(&product_key_statement(&self.pem)?, &sig)
            .map_err(|_| LicenseError::chain(ChainLink::Product, "root signature does not verify"))
    }

    /// The normalized product public key PEM.
    #[must_use]
    pub fn pem(&self) -> &str {
        &self.pem
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.key.algorithm()
    }

    #[must_use]
    pub fn root_signature(&self) -> Option<&str> {
        self.root_signature.as_deref()
    }

    /// Key used to encrypt exported tokens for holders of this anchor.
    #[must_use]
    pub fn transit_key(&self) -> &TransitKey {
        &self.transit
    }
}
