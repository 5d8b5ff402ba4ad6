//! Core type definitions for DecentriLicense.
//!
//! This crate defines the small, dependency-light types shared by every
//! other crate in the workspace:
//! - Token and device identifiers
//! - The `Clock` abstraction used for expiry checks and ledger timestamps
//! - Wire types of the rendezvous registry

mod clock;
mod ids;
pub mod registry;

pub use clock::{Clock, FixedClock, SystemClock};
pub use ids::{DeviceId, TokenId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
