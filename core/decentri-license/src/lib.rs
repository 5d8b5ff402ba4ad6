//! Licensing core for DecentriLicense.
//!
//! This crate handles:
//! - The token model and its canonical signed statements
//! - Offline verification of the root → product → license → token chain
//! - The hash-chained usage ledger embedded in every activated token
//! - Encrypted import/export of tokens for hand-off between devices
//! - Device identity used for election and binding
//! - Issuance tooling for anchors, license keys and tokens
//!
//! # Design Principles
//!
//! - **Offline-first**: verification never touches the network
//! - **Immutable tokens**: every amendment yields a new token value
//! - **Ledger is authoritative**: the signed, highest-sequence binding wins
//!   over any election or registry outcome
//!
//! # Token Format
//!
//! Tokens are JSON objects. Signatures are standard base64 over the canonical
//! statements in `canonical`; public keys are SPKI PEM.

pub mod canonical;
mod anchor;
mod chain;
mod codec;
mod device;
mod error;
mod issuer;
mod ledger;
mod token;
mod verifier;

pub use anchor::TrustAnchor;
pub use chain::ChainLink;
pub use codec::{export_encrypted, import};
pub use device::{environment_hash, DeviceFingerprint, DeviceIdentity};
pub use error::{ErrorKind, LicenseError, LicenseResult};
pub use issuer::{LicenseIssuer, ProductAuthority, RootAuthority, TokenRequest};
pub use ledger::{
    bind, compare_state_chains, extend, replay, Binding, LedgerCursor, LedgerState,
    ObservedHead, UsageEvent, ACTIVATE_ACTION, DEFAULT_USAGE_ACTION,
};
pub use token::{Token, UsageChainEntry};
pub use verifier::{verify, verify_token, VerificationOutcome};

pub use decentri_crypto::KeyAlgorithm;
