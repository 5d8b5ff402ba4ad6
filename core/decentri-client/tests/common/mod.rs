//! Shared test helpers for client tests.

#![allow(dead_code)]

use decentri_client::{ClientConfig, ClientSession, ConnectionMode, SessionParts};
use decentri_crypto::{DeviceKeyPair, SigningKeyPair};
use decentri_license::{
    DeviceIdentity, LicenseIssuer, ProductAuthority, RootAuthority, Token, TokenRequest,
};
use decentri_types::{DeviceId, FixedClock};
use std::sync::Arc;

/// 2024-01-01T00:00:00Z
pub const NOW: i64 = 1_704_067_200;

pub const APP_ID: &str = "com.example.editor";
pub const LICENSE_CODE: &str = "LIC-0001";

pub fn seed(n: u8) -> [u8; 32] {
    let mut s = [0u8; 32];
    for (i, b) in s.iter_mut().enumerate() {
        *b = n.wrapping_mul(17).wrapping_add(i as u8 + 3);
    }
    s
}

/// An Ed25519 issuance chain and its anchor file.
pub struct Issuance {
    pub root_pem: String,
    pub anchor_file: String,
    pub issuer: LicenseIssuer,
}

pub fn issuance() -> Issuance {
    let root = RootAuthority::from_key(SigningKeyPair::ed25519_from_seed(&seed(1)));
    let product = ProductAuthority::from_key(SigningKeyPair::ed25519_from_seed(&seed(2)))
        .certify_with(&root)
        .unwrap();
    let issuer = product
        .license_issuer(SigningKeyPair::ed25519_from_seed(&seed(3)), APP_ID, LICENSE_CODE)
        .unwrap();
    Issuance {
        root_pem: root.public_key_pem().unwrap(),
        anchor_file: product.anchor_file().unwrap(),
        issuer,
    }
}

impl Issuance {
    pub fn token(&self) -> Token {
        self.issuer.issue(TokenRequest::new(NOW)).unwrap()
    }

    pub fn token_json(&self) -> String {
        self.token().to_json().unwrap()
    }
}

pub fn device(id: &str, n: u8) -> DeviceIdentity {
    DeviceIdentity::new(DeviceId::parse(id).unwrap(), DeviceKeyPair::from_seed(&seed(n)))
}

pub fn config(mode: ConnectionMode) -> ClientConfig {
    ClientConfig {
        license_code: LICENSE_CODE.to_string(),
        preferred_mode: mode,
        udp_port: 0,
        tcp_port: 0,
        ..ClientConfig::default()
    }
}

pub fn parts(id: &str, n: u8, clock: &FixedClock) -> SessionParts {
    SessionParts::new(device(id, n), Arc::new(clock.clone()))
}

/// An offline session with the anchor already set.
pub fn offline_session(issuance: &Issuance, id: &str, n: u8) -> (ClientSession, FixedClock) {
    let clock = FixedClock::new(NOW);
    let mut session = ClientSession::new(
        config(ConnectionMode::Offline),
        ConnectionMode::Offline,
        parts(id, n, &clock),
    );
    session.set_trust_anchor(&issuance.anchor_file).unwrap();
    (session, clock)
}
