//! The client session: one trust anchor, one current token, one device.
//!
//! All token work is synchronous and offline. Only `activate_bind_device`
//! and the hand-off helpers suspend on the network.

use crate::config::{ClientConfig, ConnectionMode};
use crate::error::{ClientError, ClientResult};
#[cfg(feature = "online")]
use crate::registry::RegistryClient;
#[cfg(feature = "online")]
use decentri_types::registry::{DeviceRecord, TransferRequest};
use decentri_election::{
    run_election, send_token, Candidate, DeviceState, ElectionMachine, ElectionOutcome,
    ElectionTransport, HandoffListener, HolderResponder, Priority, TokenAck, TokenTransfer,
};
use decentri_license::{
    compare_state_chains, environment_hash, export_encrypted, import, verify, verify_token,
    DeviceIdentity, LedgerCursor, LicenseError, Token, TrustAnchor, UsageEvent,
    VerificationOutcome,
};
use decentri_types::{Clock, DeviceId, TokenId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Collaborators a session is built from.
pub struct SessionParts {
    pub device: DeviceIdentity,
    pub clock: Arc<dyn Clock>,
    /// Election transport. `None` elects without contenders.
    pub transport: Option<Arc<dyn ElectionTransport>>,
    #[cfg(feature = "online")]
    pub registry: Option<RegistryClient>,
}

impl SessionParts {
    /// Parts with no network collaborators.
    #[must_use]
    pub fn new(device: DeviceIdentity, clock: Arc<dyn Clock>) -> Self {
        Self {
            device,
            clock,
            transport: None,
            #[cfg(feature = "online")]
            registry: None,
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn ElectionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[cfg(feature = "online")]
    #[must_use]
    pub fn with_registry(mut self, registry: RegistryClient) -> Self {
        self.registry = Some(registry);
        self
    }
}

/// Result of `activate_bind_device`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// This device holds the binding.
    Bound,
    /// Another device coordinates the binding; nothing was changed here.
    Deferred {
        coordinator: DeviceId,
        /// Hand-off port the coordinator advertised (0 = unknown).
        tcp_port: u16,
    },
}

impl ActivationOutcome {
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound)
    }

    /// Renders the outcome as a structured result.
    #[must_use]
    pub fn outcome(&self) -> VerificationOutcome {
        match self {
            Self::Bound => VerificationOutcome::valid(),
            Self::Deferred { coordinator, .. } => VerificationOutcome::from_error(
                &LicenseError::NotBound(format!("device {coordinator} coordinates this license")),
            ),
        }
    }
}

/// Snapshot returned by `get_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub has_token: bool,
    /// The token is bound to this device.
    pub is_activated: bool,
    pub issue_time: i64,
    pub expire_time: i64,
    pub state_index: u64,
    pub token_id: String,
    pub holder_device_id: String,
    pub app_id: String,
    pub license_code: String,
    /// `Some(false)` when the token was issued for a different user or host.
    pub environment_matches: Option<bool>,
    pub device_state: DeviceState,
}

/// Process-local licensing state.
pub struct ClientSession {
    config: ClientConfig,
    mode: ConnectionMode,
    device: DeviceIdentity,
    clock: Arc<dyn Clock>,
    transport: Option<Arc<dyn ElectionTransport>>,
    #[cfg(feature = "online")]
    registry: Option<RegistryClient>,
    /// Answers contenders while this device holds the current token.
    responder: Option<HolderResponder>,
    anchor: Option<TrustAnchor>,
    current: Option<Token>,
    activated: Option<Token>,
    cursor: LedgerCursor,
    machine: ElectionMachine,
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("mode", &self.mode)
            .field("device_id", self.device.device_id())
            .field("has_anchor", &self.anchor.is_some())
            .field("token_id", &self.current.as_ref().map(Token::token_id))
            .field("device_state", &self.machine.state())
            .field("defending", &self.responder.as_ref().map(HolderResponder::token_id))
            .finish_non_exhaustive()
    }
}

impl ClientSession {
    /// Creates a session. `mode` is the effective connection mode after
    /// degradation.
    #[must_use]
    pub fn new(config: ClientConfig, mode: ConnectionMode, parts: SessionParts) -> Self {
        Self {
            config,
            mode,
            device: parts.device,
            clock: parts.clock,
            transport: parts.transport,
            #[cfg(feature = "online")]
            registry: parts.registry,
            responder: None,
            anchor: None,
            current: None,
            activated: None,
            cursor: LedgerCursor::new(),
            machine: ElectionMachine::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The connection mode in effect.
    #[must_use]
    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        self.device.device_id()
    }

    fn anchor(&self) -> ClientResult<&TrustAnchor> {
        self.anchor.as_ref().ok_or(ClientError::NoTrustAnchor)
    }

    fn current(&self) -> ClientResult<&Token> {
        self.current.as_ref().ok_or(ClientError::NoToken)
    }

    fn holds_binding(&self, token: &Token) -> bool {
        token.holder_device_id() == Some(self.device.device_id())
    }

    // ── Trust anchor and import ──

    /// Sets the product public key tokens are verified against.
    ///
    /// With a pinned root key in the configuration the anchor must carry a
    /// valid `ROOT_SIGNATURE`.
    pub fn set_trust_anchor(&mut self, anchor_file: &str) -> ClientResult<()> {
        if anchor_file.trim().is_empty() {
            return Err(ClientError::InvalidArgument("trust anchor is empty".to_string()));
        }
        let anchor = match &self.config.root_public_key {
            Some(root) => TrustAnchor::parse_pinned(anchor_file, root)?,
            None => TrustAnchor::parse(anchor_file)?,
        };
        info!(algorithm = %anchor.algorithm(), "trust anchor set");
        self.anchor = Some(anchor);
        Ok(())
    }

    /// Imports an encrypted export or a plain token JSON as the current token.
    ///
    /// Snapshots behind a ledger head this session already observed, or
    /// older than the current token, are rejected with `SequenceConflict`.
    pub fn import_token(&mut self, data: &str) -> ClientResult<TokenId> {
        let token = import(data, self.anchor.as_ref())?;

        if !self.config.license_code.is_empty() && token.license_code() != self.config.license_code {
            return Err(ClientError::InvalidArgument(format!(
                "token is for license {}, expected {}",
                token.license_code(),
                self.config.license_code
            )));
        }

        self.cursor.check(&token)?;
        if let Some(current) = &self.current
            && current.token_id() == token.token_id()
            && compare_state_chains(&token, current) == Ordering::Less
        {
            return Err(LicenseError::SequenceConflict {
                observed: current.state_index(),
                reason: "imported token has an older state chain".to_string(),
            }
            .into());
        }

        let token_id = token.token_id().clone();
        if self
            .activated
            .as_ref()
            .is_some_and(|a| a.token_id() != &token_id)
        {
            self.activated = None;
        }
        debug!(token_id = %token_id, entries = token.usage_chain().len(), "token imported");
        self.current = Some(token);
        Ok(token_id)
    }

    // ── Verification ──

    /// Verifies the current token offline against the trust anchor.
    pub fn offline_verify_current_token(&mut self) -> ClientResult<VerificationOutcome> {
        let anchor = self.anchor.as_ref().ok_or(ClientError::NoTrustAnchor)?;
        let token = self.current.as_ref().ok_or(ClientError::NoToken)?;
        let outcome = verify(token, anchor, self.clock.now());
        if outcome.valid {
            self.cursor.observe(token)?;
        }
        Ok(outcome)
    }

    // ── Activation ──

    /// Elects which device binds the current token and binds it here when
    /// this device coordinates.
    ///
    /// The token must verify first. A token already bound to this device is
    /// returned as `Bound` without an election.
    pub async fn activate_bind_device(&mut self) -> ClientResult<ActivationOutcome> {
        let now = self.clock.now();
        let token = self.current()?.clone();
        verify_token(&token, self.anchor()?, now)?;
        self.cursor.check(&token)?;

        let holds_binding = self.holds_binding(&token);
        if holds_binding {
            self.cursor.observe(&token)?;
            self.defend_binding(&token);
            self.activated = Some(token);
            return Ok(ActivationOutcome::Bound);
        }

        #[cfg(feature = "online")]
        {
            if let Some(deferred) = self.registry_holder(&token).await {
                return Ok(deferred);
            }
        }

        // Our own responder would answer our Discover.
        self.responder = None;
        let local = Candidate::new(
            token.token_id().clone(),
            Priority {
                holds_binding,
                device_id: self.device.device_id().clone(),
                proposed_at: now,
            },
        )
        .with_tcp_port(self.config.tcp_port);
        let transport = match self.mode {
            ConnectionMode::Offline => None,
            ConnectionMode::LanP2p | ConnectionMode::WanRegistry => self.transport.as_deref(),
        };

        match run_election(&mut self.machine, transport, local, &self.config.election).await? {
            ElectionOutcome::Coordinator => {
                let bound = self.cursor.bind(&token, &self.device, now);
                self.machine.complete()?;
                let bound = bound?;
                info!(token_id = %bound.token_id(), device_id = %self.device.device_id(), "token bound");
                self.defend_binding(&bound);
                self.current = Some(bound.clone());
                self.activated = Some(bound);

                #[cfg(feature = "online")]
                {
                    self.register_holder().await;
                }

                Ok(ActivationOutcome::Bound)
            }
            ElectionOutcome::Follower { coordinator, tcp_port } => {
                self.machine.complete()?;
                info!(%coordinator, "binding deferred to coordinator");
                Ok(ActivationOutcome::Deferred {
                    coordinator,
                    tcp_port,
                })
            }
        }
    }

    /// Keeps answering LAN contenders for `token` while this session holds
    /// it. No-op offline or without a transport.
    fn defend_binding(&mut self, token: &Token) {
        if self.mode == ConnectionMode::Offline {
            return;
        }
        let Some(transport) = &self.transport else {
            return;
        };
        if self
            .responder
            .as_ref()
            .is_some_and(|r| r.token_id() == token.token_id() && r.is_running())
        {
            return;
        }
        let holder = Candidate::new(
            token.token_id().clone(),
            Priority {
                holds_binding: true,
                device_id: self.device.device_id().clone(),
                proposed_at: self.clock.now(),
            },
        )
        .with_tcp_port(self.config.tcp_port);
        self.responder = Some(HolderResponder::spawn(
            Arc::clone(transport),
            holder,
            self.config.election.clone(),
        ));
    }

    /// Asks the registry who holds the license. Lookup failures are a hint
    /// lost, not an error.
    #[cfg(feature = "online")]
    async fn registry_holder(&self, token: &Token) -> Option<ActivationOutcome> {
        if self.mode != ConnectionMode::WanRegistry {
            return None;
        }
        let registry = self.registry.as_ref()?;
        match registry.holder(token.license_code()).await {
            Ok(Some(holder)) if &holder.device_id != self.device.device_id() => {
                info!(holder = %holder.device_id, "registry reports another holder");
                Some(ActivationOutcome::Deferred {
                    coordinator: holder.device_id,
                    tcp_port: holder.tcp_port,
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "registry holder lookup failed, electing on LAN");
                None
            }
        }
    }

    #[cfg(feature = "online")]
    fn holder_record(&self, token: &Token) -> DeviceRecord {
        DeviceRecord {
            device_id: self.device.device_id().clone(),
            license_code: token.license_code().to_string(),
            public_ip: String::new(),
            tcp_port: self.config.tcp_port,
            last_seen: None,
        }
    }

    #[cfg(feature = "online")]
    fn wan_registry(&self) -> Option<&RegistryClient> {
        match self.mode {
            ConnectionMode::WanRegistry => self.registry.as_ref(),
            ConnectionMode::LanP2p | ConnectionMode::Offline => None,
        }
    }

    #[cfg(feature = "online")]
    async fn register_holder(&self) {
        let (Some(registry), Some(token)) = (self.wan_registry(), &self.current) else {
            return;
        };
        if let Err(e) = registry.register(&self.holder_record(token)).await {
            warn!(error = %e, "registry registration failed");
        }
    }

    /// Keeps this device's registry entry alive while it holds the current
    /// token. Call it well within the registry's inactivity window.
    ///
    /// A registry that forgot the device is registered with again. Does
    /// nothing outside WAN mode or when another device holds the token.
    #[cfg(feature = "online")]
    pub async fn heartbeat(&self) -> ClientResult<()> {
        let token = self.current()?;
        let Some(registry) = self.wan_registry() else {
            return Ok(());
        };
        if !self.holds_binding(token) {
            return Ok(());
        }
        if !registry.heartbeat(self.device.device_id()).await? {
            info!("registry forgot this device, registering again");
            registry.register(&self.holder_record(token)).await?;
        }
        Ok(())
    }

    /// Tells the registry that `to_device` took the license over.
    #[cfg(feature = "online")]
    async fn report_transfer(&self, transfer: &TokenTransfer, to_device: DeviceId) {
        let (Some(registry), Some(token)) = (self.wan_registry(), &self.current) else {
            return;
        };
        let request = TransferRequest {
            token_id: transfer.token_id.clone(),
            license_code: token.license_code().to_string(),
            from_device: transfer.from_device.clone(),
            to_device,
            token_data: Some(transfer.blob.clone()),
        };
        if let Err(e) = registry.transfer(&request).await {
            warn!(error = %e, "registry transfer failed");
        }
    }

    // ── Usage ──

    /// Records application usage JSON as one ledger entry.
    ///
    /// `{"action": "...", "params": {...}}` names the action; any other
    /// object is recorded as the params of a `usage` entry.
    pub fn record_usage(&mut self, usage_json: &str) -> ClientResult<()> {
        let event = UsageEvent::from_json(usage_json)?;
        self.record_usage_event(&event.action, event.params)
    }

    /// Appends one ledger entry signed by this device.
    ///
    /// The token must verify at the current time; an expired or forged
    /// token is never extended.
    pub fn record_usage_event(&mut self, action: &str, params: Map<String, Value>) -> ClientResult<()> {
        let anchor = self.anchor.as_ref().ok_or(ClientError::NoTrustAnchor)?;
        let token = self.current.as_ref().ok_or(ClientError::NoToken)?;
        let now = self.clock.now();
        verify_token(token, anchor, now)?;
        let next = self.cursor.append(token, &self.device, action, params, now)?;
        debug!(token_id = %next.token_id(), seq = next.state_index(), action, "usage recorded");
        self.current = Some(next);
        Ok(())
    }

    // ── Export ──

    /// Encrypts the current token for hand-off.
    pub fn export_current_token_encrypted(&self) -> ClientResult<String> {
        Ok(export_encrypted(self.current()?, self.anchor()?)?)
    }

    /// Encrypts the token as it was right after this session's activation.
    pub fn export_activated_token_encrypted(&self) -> ClientResult<String> {
        let activated = self.activated.as_ref().ok_or_else(|| {
            LicenseError::NotBound("no activation in this session".to_string())
        })?;
        Ok(export_encrypted(activated, self.anchor()?)?)
    }

    /// Encrypts the current token once usage was recorded after activation.
    pub fn export_state_changed_token_encrypted(&self) -> ClientResult<String> {
        let token = self.current()?;
        if token.last_seq().is_none_or(|seq| seq == 0) {
            return Err(ClientError::InvalidArgument(
                "no usage has been recorded since activation".to_string(),
            ));
        }
        Ok(export_encrypted(token, self.anchor()?)?)
    }

    /// The current token as JSON.
    pub fn current_token_json(&self) -> ClientResult<String> {
        Ok(self.current()?.to_json()?)
    }

    // ── Status ──

    #[must_use]
    pub fn get_status(&self) -> Status {
        let device_state = self.machine.state();
        let Some(token) = &self.current else {
            return Status {
                has_token: false,
                is_activated: false,
                issue_time: 0,
                expire_time: 0,
                state_index: 0,
                token_id: String::new(),
                holder_device_id: String::new(),
                app_id: String::new(),
                license_code: String::new(),
                environment_matches: None,
                device_state,
            };
        };
        Status {
            has_token: true,
            is_activated: self.holds_binding(token),
            issue_time: token.issue_time(),
            expire_time: token.expire_time(),
            state_index: token.state_index(),
            token_id: token.token_id().to_string(),
            holder_device_id: token
                .holder_device_id()
                .map(ToString::to_string)
                .unwrap_or_default(),
            app_id: token.app_id().to_string(),
            license_code: token.license_code().to_string(),
            environment_matches: token.environment_hash().map(|h| h == environment_hash()),
            device_state,
        }
    }

    #[must_use]
    pub fn get_device_state(&self) -> DeviceState {
        self.machine.state()
    }

    /// Drops the imported token and any running election. Observed ledger
    /// heads are kept, so stale copies stay rejected.
    pub fn reset(&mut self) {
        self.machine.abandon();
        self.responder = None;
        self.current = None;
        self.activated = None;
    }

    // ── Hand-off ──

    /// Sends the encrypted current token to a peer.
    ///
    /// Once the peer accepts, this device stops answering contenders so the
    /// peer can bind, and the registry is told in WAN mode.
    pub async fn hand_off(&mut self, peer: SocketAddr, wait: Duration) -> ClientResult<TokenAck> {
        let token = self.current()?;
        let transfer = TokenTransfer {
            token_id: token.token_id().clone(),
            from_device: self.device.device_id().clone(),
            blob: self.export_current_token_encrypted()?,
        };
        let ack = send_token(peer, transfer.clone(), wait).await?;
        if !ack.accepted {
            warn!(token_id = %ack.token_id, reason = %ack.reason, "hand-off refused");
            return Ok(ack);
        }

        if self
            .responder
            .as_ref()
            .is_some_and(|r| r.token_id() == &transfer.token_id)
        {
            self.responder = None;
        }
        info!(token_id = %transfer.token_id, %peer, "token handed off");

        #[cfg(feature = "online")]
        {
            if let Some(to_device) = ack.device_id.clone() {
                self.report_transfer(&transfer, to_device).await;
            }
        }

        Ok(ack)
    }

    /// Accepts one hand-off and imports it, acknowledging the outcome.
    pub async fn accept_hand_off(&mut self, listener: &HandoffListener) -> ClientResult<TokenId> {
        let incoming = listener.accept().await?;
        let token_id = incoming.transfer.token_id.clone();
        let result = self.import_token(&incoming.transfer.blob);
        let ack = TokenAck {
            token_id,
            accepted: result.is_ok(),
            reason: result.as_ref().err().map(ToString::to_string).unwrap_or_default(),
            device_id: Some(self.device.device_id().clone()),
        };
        if let Err(e) = incoming.respond(ack).await {
            warn!(error = %e, "failed to acknowledge hand-off");
        }
        result
    }
}
