//! Client configuration.

use decentri_election::{ElectionTimings, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use decentri_types::DeviceId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How the client coordinates bindings with other devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Consult the rendezvous registry first, then elect on the LAN.
    WanRegistry,
    /// Elect among peers on the local segment.
    #[default]
    LanP2p,
    /// No network traffic; activation always binds locally.
    Offline,
}

/// Configuration accepted by [`crate::LicenseClient::initialize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// License code imported tokens must carry. Empty accepts any (verify-only use).
    pub license_code: String,
    pub preferred_mode: ConnectionMode,
    /// Discovery and election port. 0 disables the LAN transport.
    pub udp_port: u16,
    /// Token hand-off port advertised to peers. 0 disables hand-off.
    pub tcp_port: u16,
    /// Rendezvous registry base URL, e.g. `http://registry.local:3883`.
    pub registry_server_url: String,
    /// Timeout for each registry request, in milliseconds.
    pub registry_timeout_ms: u64,
    pub election: ElectionTimings,
    /// Overrides the fingerprint-derived device id.
    pub device_id: Option<DeviceId>,
    /// Where the device key is persisted. `None` uses a fresh key per session.
    pub device_key_path: Option<PathBuf>,
    /// Root authority public key (PEM) the trust anchor must be certified by.
    pub root_public_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            license_code: String::new(),
            preferred_mode: ConnectionMode::default(),
            udp_port: DEFAULT_UDP_PORT,
            tcp_port: DEFAULT_TCP_PORT,
            registry_server_url: String::new(),
            registry_timeout_ms: 5000,
            election: ElectionTimings::default(),
            device_id: None,
            device_key_path: None,
            root_public_key: None,
        }
    }
}

impl ClientConfig {
    /// A configuration that never touches the network.
    #[must_use]
    pub fn offline(license_code: impl Into<String>) -> Self {
        Self {
            license_code: license_code.into(),
            preferred_mode: ConnectionMode::Offline,
            udp_port: 0,
            tcp_port: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }

    /// Whether the LAN election transport should be opened.
    #[must_use]
    pub fn uses_lan(&self) -> bool {
        self.preferred_mode != ConnectionMode::Offline && self.udp_port != 0
    }

    /// Whether the registry should be consulted.
    #[must_use]
    pub fn uses_registry(&self) -> bool {
        self.preferred_mode == ConnectionMode::WanRegistry
            && !self.registry_server_url.trim().is_empty()
    }
}
