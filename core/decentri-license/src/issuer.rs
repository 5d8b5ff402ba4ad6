//! Issuance of anchors, license keys and tokens.
//!
//! The chain has a fixed depth:
//! - `RootAuthority` certifies product keys (`ROOT_SIGNATURE:` line)
//! - `ProductAuthority` is the trust anchor and certifies license keys
//!   (the token's `root_signature`)
//! - `LicenseIssuer` holds one license key and signs tokens

use crate::canonical::{license_key_statement, product_key_statement, token_statement};
use crate::error::{LicenseError, LicenseResult};
use crate::token::Token;
use decentri_crypto::{b64_encode, KeyAlgorithm, SigningKeyPair};
use decentri_types::TokenId;

/// The root authority. Only its public key is distributed.
#[derive(Debug)]
pub struct RootAuthority {
    key: SigningKeyPair,
}

impl RootAuthority {
    /// Generates a root authority key of the given family.
    pub fn generate(alg: KeyAlgorithm) -> LicenseResult<Self> {
        Ok(Self::from_key(SigningKeyPair::generate(alg)?))
    }

    #[must_use]
    pub fn from_key(key: SigningKeyPair) -> Self {
        Self { key }
    }

    pub fn public_key_pem(&self) -> LicenseResult<String> {
        Ok(self.key.public_key_pem()?)
    }

    /// Signs a product public key, returning the base64 root signature.
    pub fn certify_product(&self, product_public_key_pem: &str) -> LicenseResult<String> {
        let statement = product_key_statement(product_public_key_pem)?;
        Ok(b64_encode(&self.key.sign(&statement)?))
    }
}

/// The product key, distributed as the trust anchor.
#[derive(Debug)]
pub struct ProductAuthority {
    key: SigningKeyPair,
    root_signature: Option<String>,
}

impl ProductAuthority {
    /// Generates a product key of the given family.
    pub fn generate(alg: KeyAlgorithm) -> LicenseResult<Self> {
        Ok(Self::from_key(SigningKeyPair::generate(alg)?))
    }

    #[must_use]
    pub fn from_key(key: SigningKeyPair) -> Self {
        Self {
            key,
            root_signature: None,
        }
    }

    /// Has the root authority certify this product key.
    pub fn certify_with(mut self, root: &RootAuthority) -> LicenseResult<Self> {
        self.root_signature = Some(root.certify_product(&self.public_key_pem()?)?);
        Ok(self)
    }

    pub fn public_key_pem(&self) -> LicenseResult<String> {
        Ok(self.key.public_key_pem()?)
    }

    /// Renders the anchor file handed to clients.
    pub fn anchor_file(&self) -> LicenseResult<String> {
        let mut content = self.public_key_pem()?;
        if let Some(sig) = &self.root_signature {
            content.push_str("ROOT_SIGNATURE:");
            content.push_str(sig);
            content.push('\n');
        }
        Ok(content)
    }

    /// Certifies `license_key` for one license code, producing its issuer.
    pub fn license_issuer(
        &self,
        license_key: SigningKeyPair,
        app_id: &str,
        license_code: &str,
    ) -> LicenseResult<LicenseIssuer> {
        if app_id.trim().is_empty() || license_code.trim().is_empty() {
            return Err(LicenseError::InvalidArgument(
                "app id and license code are required".to_string(),
            ));
        }
        let license_public_key = license_key.public_key_pem()?;
        let statement =
            license_key_statement(license_key.algorithm(), app_id, license_code, &license_public_key)?;
        let root_signature = b64_encode(&self.key.sign(&statement)?);

        Ok(LicenseIssuer {
            key: license_key,
            app_id: app_id.to_string(),
            license_code: license_code.to_string(),
            license_public_key,
            root_signature,
        })
    }
}

/// Parameters of one issued token.
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    pub token_id: Option<TokenId>,
    pub issue_time: i64,
    /// 0 means the token never expires.
    pub expire_time: i64,
    pub environment_hash: Option<String>,
}

impl TokenRequest {
    #[must_use]
    pub fn new(issue_time: i64) -> Self {
        Self {
            issue_time,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn expires_at(mut self, expire_time: i64) -> Self {
        self.expire_time = expire_time;
        self
    }

    #[must_use]
    pub fn with_token_id(mut self, token_id: TokenId) -> Self {
        self.token_id = Some(token_id);
        self
    }

    #[must_use]
    pub fn with_environment_hash(mut self, hash: impl Into<String>) -> Self {
        self.environment_hash = Some(hash.into());
        self
    }
}

/// Holds a certified license key and signs tokens for its license code.
#[derive(Debug)]
pub struct LicenseIssuer {
    key: SigningKeyPair,
    app_id: String,
    license_code: String,
    license_public_key: String,
    root_signature: String,
}

impl LicenseIssuer {
    #[must_use]
    pub fn license_code(&self) -> &str {
        &self.license_code
    }

    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.key.algorithm()
    }

    /// Issues a signed, unbound token.
    pub fn issue(&self, request: TokenRequest) -> LicenseResult<Token> {
        if request.expire_time < 0 {
            return Err(LicenseError::InvalidArgument(
                "expire time must be 0 or a Unix time".to_string(),
            ));
        }
        let token = Token::unsigned(
            request.token_id.unwrap_or_else(TokenId::generate),
            self.app_id.clone(),
            self.license_code.clone(),
            self.key.algorithm(),
            request.issue_time,
            request.expire_time,
            self.license_public_key.clone(),
            self.root_signature.clone(),
            request.environment_hash.filter(|h| !h.is_empty()),
        );
        let signature = b64_encode(&self.key.sign(&token_statement(&token)?)?);
        Ok(token.with_signature(signature))
    }
}
