//! Links of the trust chain, used to report where verification failed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One link of the fixed-depth chain
/// root → product → license key → token → ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainLink {
    /// Root authority signature over the product key.
    Product,
    /// Product key signature over the license key (`root_signature`).
    LicenseKey,
    /// License key signature over the token payload.
    Token,
    /// A ledger entry, or the signed head when it is the last one.
    LedgerEntry(u64),
}

impl fmt::Display for ChainLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product => f.write_str("product key"),
            Self::LicenseKey => f.write_str("license key"),
            Self::Token => f.write_str("token signature"),
            Self::LedgerEntry(seq) => write!(f, "ledger entry {seq}"),
        }
    }
}
