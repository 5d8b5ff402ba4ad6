//! Error types for the client surface.

use decentri_election::ElectionError;
use decentri_license::{ErrorKind, LicenseError, VerificationOutcome};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by the client session.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not initialized")]
    NotInitialized,

    #[error("client is already initialized")]
    AlreadyInitialized,

    #[error("no trust anchor has been set")]
    NoTrustAnchor,

    #[error("no token has been imported")]
    NoToken,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Registry request failed or answered unexpectedly.
    #[error("registry error: {0}")]
    Registry(String),

    #[error(transparent)]
    License(#[from] LicenseError),

    #[error(transparent)]
    Election(#[from] ElectionError),
}

impl ClientError {
    /// Returns the stable kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized | Self::NoTrustAnchor | Self::NoToken => ErrorKind::NotInitialized,
            Self::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Registry(_) => ErrorKind::NetworkError,
            Self::License(e) => e.kind(),
            Self::Election(ElectionError::Abandoned(_)) => ErrorKind::ElectionAbandoned,
            Self::Election(ElectionError::InvalidState { .. }) => ErrorKind::InvalidArgument,
            Self::Election(_) => ErrorKind::NetworkError,
        }
    }

    /// Renders this error as a structured outcome.
    #[must_use]
    pub fn outcome(&self) -> VerificationOutcome {
        match self {
            Self::License(e) => VerificationOutcome::from_error(e),
            other => VerificationOutcome {
                valid: false,
                error_message: other.to_string(),
                error: Some(other.kind()),
                failed_link: None,
            },
        }
    }
}
