//! Shared test helpers for license tests.

#![allow(dead_code)]

use decentri_crypto::{DeviceKeyPair, SigningKeyPair};
use decentri_license::{
    DeviceIdentity, LicenseIssuer, ProductAuthority, RootAuthority, Token, TokenRequest,
    TrustAnchor,
};
use decentri_types::DeviceId;
use serde_json::Value;

/// Fixed "current" time used across tests (2024-01-01T00:00:00Z).
pub const NOW: i64 = 1_704_067_200;

pub const APP_ID: &str = "com.example.editor";
pub const LICENSE_CODE: &str = "LIC-0001";

/// Returns a deterministic 32-byte seed.
pub fn seed(n: u8) -> [u8; 32] {
    let mut s = [0u8; 32];
    for (i, b) in s.iter_mut().enumerate() {
        *b = n.wrapping_mul(31).wrapping_add(i as u8 + 1);
    }
    s
}

/// A complete Ed25519 issuance chain with its parsed trust anchor.
pub struct Fixture {
    pub root: RootAuthority,
    pub product: ProductAuthority,
    pub issuer: LicenseIssuer,
    pub anchor_file: String,
    pub anchor: TrustAnchor,
}

pub fn fixture() -> Fixture {
    let root = RootAuthority::from_key(SigningKeyPair::ed25519_from_seed(&seed(1)));
    let product = ProductAuthority::from_key(SigningKeyPair::ed25519_from_seed(&seed(2)))
        .certify_with(&root)
        .unwrap();
    let issuer = product
        .license_issuer(SigningKeyPair::ed25519_from_seed(&seed(3)), APP_ID, LICENSE_CODE)
        .unwrap();
    let anchor_file = product.anchor_file().unwrap();
    let anchor = TrustAnchor::parse(&anchor_file).unwrap();
    Fixture {
        root,
        product,
        issuer,
        anchor_file,
        anchor,
    }
}

impl Fixture {
    /// Issues a perpetual token at `NOW`.
    pub fn token(&self) -> Token {
        self.issuer.issue(TokenRequest::new(NOW)).unwrap()
    }

    pub fn token_expiring(&self, expire_time: i64) -> Token {
        self.issuer
            .issue(TokenRequest::new(NOW).expires_at(expire_time))
            .unwrap()
    }
}

/// A device with a deterministic key.
pub fn device(id: &str, n: u8) -> DeviceIdentity {
    DeviceIdentity::new(
        DeviceId::parse(id).unwrap(),
        DeviceKeyPair::from_seed(&seed(n)),
    )
}

/// Applies `edit` to the JSON form of `token` and parses the result.
pub fn edit_json(token: &Token, edit: impl FnOnce(&mut Value)) -> Token {
    let mut value: Value = serde_json::from_str(&token.to_json().unwrap()).unwrap();
    edit(&mut value);
    Token::from_json(&value.to_string()).unwrap()
}

/// Replaces the character at `idx` with a different base64 character.
pub fn flip_char(s: &str, idx: usize) -> String {
    s.char_indices()
        .map(|(i, c)| {
            if i == idx {
                if c == 'A' { 'B' } else { 'A' }
            } else {
                c
            }
        })
        .collect()
}
