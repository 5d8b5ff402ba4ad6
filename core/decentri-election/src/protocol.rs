//! Election protocol messages and types.
//!
//! Devices contending for the same token exchange their priority:
//! 1. `Discover` is broadcast when an activation starts
//! 2. Every participant answers a `Discover` with `DiscoverAck`
//! 3. Participants that observed a contender broadcast a `Proposal`
//! 4. The winner announces itself with `Victory`
//!
//! `TokenTransfer` and `TokenAck` move an exported token to a peer over TCP.

use decentri_types::{DeviceId, TokenId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default UDP port for discovery and election.
pub const DEFAULT_UDP_PORT: u16 = 13325;

/// Default TCP port for token hand-off.
pub const DEFAULT_TCP_PORT: u16 = 23325;

/// Total order deciding which contender binds a token.
///
/// A device already holding the binding wins, then the greater device id,
/// then the earlier proposal time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Priority {
    pub holds_binding: bool,
    pub device_id: DeviceId,
    /// Unix time when the device started contending.
    pub proposed_at: i64,
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.holds_binding
            .cmp(&other.holds_binding)
            .then_with(|| self.device_id.cmp(&other.device_id))
            .then_with(|| other.proposed_at.cmp(&self.proposed_at))
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A participant in the election for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub token_id: TokenId,
    pub priority: Priority,
    /// Random per-run value; distinguishes our own echoes from a peer that
    /// reuses our device id.
    pub nonce: u64,
    /// TCP port the candidate accepts token hand-offs on (0 = none).
    #[serde(default)]
    pub tcp_port: u16,
}

impl Candidate {
    /// Creates a candidate with a fresh nonce.
    #[must_use]
    pub fn new(token_id: TokenId, priority: Priority) -> Self {
        Self {
            token_id,
            priority,
            nonce: rand::random(),
            tcp_port: 0,
        }
    }

    /// Sets the advertised hand-off port.
    #[must_use]
    pub fn with_tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        &self.priority.device_id
    }
}

/// An exported token offered to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub token_id: TokenId,
    pub from_device: DeviceId,
    /// Encrypted export blob.
    pub blob: String,
}

/// Reply to a `TokenTransfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAck {
    pub token_id: TokenId,
    pub accepted: bool,
    /// Why the transfer was refused, empty on success.
    #[serde(default)]
    pub reason: String,
    /// The receiving device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

/// An election protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum ElectionMessage {
    /// Start of an activation; asks contenders to reveal themselves.
    Discover(Candidate),

    /// Answer to a `Discover`.
    DiscoverAck(Candidate),

    /// Priority announcement after a contender was observed.
    Proposal(Candidate),

    /// The sender won the election.
    Victory(Candidate),

    /// Token hand-off request.
    TokenTransfer(TokenTransfer),

    /// Token hand-off reply.
    TokenAck(TokenAck),
}

impl ElectionMessage {
    /// The candidate carried by election messages.
    #[must_use]
    pub fn candidate(&self) -> Option<&Candidate> {
        match self {
            Self::Discover(c) | Self::DiscoverAck(c) | Self::Proposal(c) | Self::Victory(c) => {
                Some(c)
            }
            Self::TokenTransfer(_) | Self::TokenAck(_) => None,
        }
    }

    /// Short message name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discover(_) => "discover",
            Self::DiscoverAck(_) => "discover_ack",
            Self::Proposal(_) => "proposal",
            Self::Victory(_) => "victory",
            Self::TokenTransfer(_) => "token_transfer",
            Self::TokenAck(_) => "token_ack",
        }
    }
}
