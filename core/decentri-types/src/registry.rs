//! JSON bodies exchanged with the rendezvous registry.
//!
//! The registry only records which device last claimed a license code and
//! where it can be reached. It is a hint for clients; the token ledger stays
//! authoritative.

use crate::{DeviceId, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device as registered with the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub license_code: String,
    /// Address the registry saw the device from; filled in by the server
    /// when empty.
    #[serde(default)]
    pub public_ip: String,
    #[serde(default)]
    pub tcp_port: u16,
    /// Set by the server on every registration and heartbeat.
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Body of `POST /api/devices/heartbeat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub device_id: DeviceId,
}

/// Body of `POST /api/tokens/transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub token_id: TokenId,
    pub license_code: String,
    pub from_device: DeviceId,
    pub to_device: DeviceId,
    /// Optional exported token, checked against the license code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_data: Option<String>,
}

/// Generic `{success, message}` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Counters reported by `GET /api/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_devices: u64,
    pub total_licenses: u64,
    pub registrations: u64,
    pub heartbeats: u64,
    pub queries: u64,
}
