//! Lifecycle wrapper around [`ClientSession`].

use crate::config::{ClientConfig, ConnectionMode};
use crate::error::{ClientError, ClientResult};
#[cfg(feature = "online")]
use crate::registry::RegistryClient;
use crate::session::{ClientSession, SessionParts};
use decentri_election::UdpTransport;
use decentri_license::DeviceIdentity;
use decentri_types::SystemClock;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns at most one session. Every operation on an uninitialized client
/// fails with `NotInitialized`.
#[derive(Debug, Default)]
pub struct LicenseClient {
    session: Option<ClientSession>,
}

impl LicenseClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Initializes from configuration: loads the device identity, opens the
    /// LAN transport and checks the registry.
    ///
    /// Failing to open the transport is a `NetworkError`. An unreachable
    /// registry degrades to LAN election. On any failure the client stays
    /// uninitialized.
    pub async fn initialize(&mut self, config: ClientConfig) -> ClientResult<()> {
        if self.session.is_some() {
            return Err(ClientError::AlreadyInitialized);
        }

        let mut device = match &config.device_key_path {
            Some(path) => DeviceIdentity::load_or_create(path)?,
            None => DeviceIdentity::ephemeral()?,
        };
        if let Some(id) = &config.device_id {
            device = device.with_device_id(id.clone());
        }

        let mut parts = SessionParts::new(device, Arc::new(SystemClock));
        if config.uses_lan() {
            let transport = UdpTransport::bind(config.udp_port).await?;
            parts = parts.with_transport(Arc::new(transport));
        }

        let mode = Self::negotiate_mode(&config, &mut parts).await?;
        self.install(config, mode, parts);
        Ok(())
    }

    /// Initializes with caller-supplied collaborators. No sockets are opened.
    pub fn initialize_with(&mut self, config: ClientConfig, parts: SessionParts) -> ClientResult<()> {
        if self.session.is_some() {
            return Err(ClientError::AlreadyInitialized);
        }
        let mode = match config.preferred_mode {
            ConnectionMode::WanRegistry if !has_registry(&parts) => ConnectionMode::LanP2p,
            mode => mode,
        };
        self.install(config, mode, parts);
        Ok(())
    }

    fn install(&mut self, config: ClientConfig, mode: ConnectionMode, parts: SessionParts) {
        info!(?mode, device_id = %parts.device.device_id(), "license client initialized");
        self.session = Some(ClientSession::new(config, mode, parts));
    }

    /// Picks the effective mode, degrading WAN to LAN when the registry is
    /// unusable.
    #[cfg(feature = "online")]
    async fn negotiate_mode(config: &ClientConfig, parts: &mut SessionParts) -> ClientResult<ConnectionMode> {
        if config.preferred_mode != ConnectionMode::WanRegistry {
            return Ok(config.preferred_mode);
        }
        if !config.uses_registry() {
            warn!("no registry url configured, degrading to LAN election");
            return Ok(ConnectionMode::LanP2p);
        }

        let registry = RegistryClient::new(&config.registry_server_url, config.registry_timeout())?;
        match registry.health().await {
            Ok(true) => {
                info!(url = registry.base_url(), "registry reachable");
                parts.registry = Some(registry);
                Ok(ConnectionMode::WanRegistry)
            }
            Ok(false) => {
                warn!(url = registry.base_url(), "registry unhealthy, degrading to LAN election");
                Ok(ConnectionMode::LanP2p)
            }
            Err(e) => {
                warn!(error = %e, "registry unreachable, degrading to LAN election");
                Ok(ConnectionMode::LanP2p)
            }
        }
    }

    #[cfg(not(feature = "online"))]
    async fn negotiate_mode(config: &ClientConfig, _parts: &mut SessionParts) -> ClientResult<ConnectionMode> {
        if config.preferred_mode == ConnectionMode::WanRegistry {
            warn!("built without registry support, degrading to LAN election");
            return Ok(ConnectionMode::LanP2p);
        }
        Ok(config.preferred_mode)
    }

    /// Destroys the session.
    pub fn shutdown(&mut self) -> ClientResult<()> {
        let mut session = self.session.take().ok_or(ClientError::NotInitialized)?;
        session.reset();
        info!("license client shut down");
        Ok(())
    }

    pub fn session(&self) -> ClientResult<&ClientSession> {
        self.session.as_ref().ok_or(ClientError::NotInitialized)
    }

    pub fn session_mut(&mut self) -> ClientResult<&mut ClientSession> {
        self.session.as_mut().ok_or(ClientError::NotInitialized)
    }
}

#[cfg(feature = "online")]
fn has_registry(parts: &SessionParts) -> bool {
    parts.registry.is_some()
}

#[cfg(not(feature = "online"))]
fn has_registry(_parts: &SessionParts) -> bool {
    false
}
