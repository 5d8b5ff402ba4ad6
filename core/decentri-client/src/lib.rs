//! Client surface for DecentriLicense.
//!
//! A [`LicenseClient`] owns one [`ClientSession`], which holds:
//! - The trust anchor tokens are verified against
//! - The current token and the ledger heads observed so far
//! - The device identity and the election state machine
//!
//! Verification, usage recording and export are offline. Activation elects
//! among LAN peers (and optionally consults a rendezvous registry) before
//! binding the token to this device.

mod client;
mod config;
mod error;
#[cfg(feature = "online")]
mod registry;
mod session;

pub use client::LicenseClient;
pub use config::{ClientConfig, ConnectionMode};
pub use error::{ClientError, ClientResult};
#[cfg(feature = "online")]
pub use registry::RegistryClient;
pub use session::{ActivationOutcome, ClientSession, SessionParts, Status};

pub use decentri_election::DeviceState;
pub use decentri_license::{ErrorKind, VerificationOutcome};
