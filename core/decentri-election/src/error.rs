//! Error types for the election layer.

use crate::machine::DeviceState;
use thiserror::Error;

/// Result type for election operations.
pub type ElectionResult<T> = Result<T, ElectionError>;

/// Errors that can occur during discovery, election and hand-off.
#[derive(Debug, Error)]
pub enum ElectionError {
    /// The machine is not in a state that accepts the request.
    #[error("invalid election state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: DeviceState,
    },

    /// The election was abandoned without an outcome.
    #[error("election abandoned: {0}")]
    Abandoned(String),

    /// Network error (socket setup, send or receive).
    #[error("network error: {0}")]
    Network(String),

    /// A frame could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Peer answered with an unexpected message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
