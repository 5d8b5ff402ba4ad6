//! The election state machine.
//!
//! The machine is pure: it consumes messages and timeouts and returns the
//! messages to broadcast. Sockets and timers live in [`crate::driver`].
//!
//! ```text
//! IDLE --begin--> DISCOVERING --peer seen--> ELECTING --timeout--> COORDINATOR
//!                      |                        |
//!                      |                        +--higher peer--> FOLLOWER
//!                      +--timeout, no peers--> COORDINATOR
//! ```
//!
//! Any state returns to IDLE on `complete` or `abandon`.

use crate::error::{ElectionError, ElectionResult};
use crate::protocol::{Candidate, ElectionMessage};
use decentri_types::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Election role of this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    Idle,
    Discovering,
    Electing,
    Coordinator,
    Follower,
}

impl DeviceState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Discovering => "DISCOVERING",
            Self::Electing => "ELECTING",
            Self::Coordinator => "COORDINATOR",
            Self::Follower => "FOLLOWER",
        }
    }

    /// Whether an election is running.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Discovering | Self::Electing)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a finished election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// This device won and may bind the token.
    Coordinator,
    /// Another device won.
    Follower {
        coordinator: DeviceId,
        /// Hand-off port advertised by the coordinator.
        tcp_port: u16,
    },
}

/// Deterministic election state machine for one token at a time.
#[derive(Debug, Default)]
pub struct ElectionMachine {
    state: Option<Running>,
}

#[derive(Debug)]
struct Running {
    phase: DeviceState,
    local: Candidate,
    peers: BTreeMap<DeviceId, Candidate>,
    leader: Option<Candidate>,
}

impl ElectionMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.state.as_ref().map_or(DeviceState::Idle, |r| r.phase)
    }

    /// The local candidate of the running election.
    #[must_use]
    pub fn local(&self) -> Option<&Candidate> {
        self.state.as_ref().map(|r| &r.local)
    }

    /// Number of distinct contenders observed so far.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.state.as_ref().map_or(0, |r| r.peers.len())
    }

    /// The outcome once the machine reached COORDINATOR or FOLLOWER.
    #[must_use]
    pub fn outcome(&self) -> Option<ElectionOutcome> {
        let running = self.state.as_ref()?;
        match running.phase {
            DeviceState::Coordinator => Some(ElectionOutcome::Coordinator),
            DeviceState::Follower => running.leader.as_ref().map(|leader| ElectionOutcome::Follower {
                coordinator: leader.device_id().clone(),
                tcp_port: leader.tcp_port,
            }),
            _ => None,
        }
    }

    /// Starts an election. Returns the `Discover` message to broadcast.
    pub fn begin(&mut self, local: Candidate) -> ElectionResult<ElectionMessage> {
        let current = self.state();
        if current != DeviceState::Idle {
            return Err(ElectionError::InvalidState {
                expected: "IDLE",
                actual: current,
            });
        }
        debug!(token_id = %local.token_id, device_id = %local.device_id(), "election started");
        let discover = ElectionMessage::Discover(local.clone());
        self.state = Some(Running {
            phase: DeviceState::Discovering,
            local,
            peers: BTreeMap::new(),
            leader: None,
        });
        Ok(discover)
    }

    /// Handles a received message, returning the replies to broadcast.
    ///
    /// Messages for other tokens and our own echoes are ignored. A contender
    /// with exactly our priority abandons the election.
    pub fn handle(&mut self, message: &ElectionMessage) -> ElectionResult<Vec<ElectionMessage>> {
        let Some(running) = self.state.as_mut() else {
            return Ok(Vec::new());
        };
        let Some(peer) = message.candidate() else {
            return Ok(Vec::new());
        };
        if peer.token_id != running.local.token_id || peer.nonce == running.local.nonce {
            return Ok(Vec::new());
        }

        match running.phase {
            DeviceState::Coordinator => {
                // Late contenders learn the result.
                return Ok(match message {
                    ElectionMessage::Discover(_) | ElectionMessage::Proposal(_) => {
                        vec![ElectionMessage::Victory(running.local.clone())]
                    }
                    _ => {
                        if peer.priority > running.local.priority {
                            warn!(peer = %peer.device_id(), "higher priority device claims coordination");
                        }
                        Vec::new()
                    }
                });
            }
            DeviceState::Follower | DeviceState::Idle => return Ok(Vec::new()),
            DeviceState::Discovering | DeviceState::Electing => {}
        }

        if peer.priority == running.local.priority {
            let reason = format!(
                "device {} is contending twice with identical priority",
                peer.device_id()
            );
            self.abandon();
            return Err(ElectionError::Abandoned(reason));
        }

        running
            .peers
            .entry(peer.device_id().clone())
            .and_modify(|known| {
                if peer.priority > known.priority {
                    *known = peer.clone();
                }
            })
            .or_insert_with(|| peer.clone());

        let mut replies = Vec::new();
        if matches!(message, ElectionMessage::Discover(_)) {
            replies.push(ElectionMessage::DiscoverAck(running.local.clone()));
        }

        if peer.priority > running.local.priority {
            info!(coordinator = %peer.device_id(), "higher priority device observed, following");
            running.phase = DeviceState::Follower;
            running.leader = Some(peer.clone());
        } else if running.phase == DeviceState::Discovering {
            debug!(peer = %peer.device_id(), "contender observed, electing");
            running.phase = DeviceState::Electing;
            replies.push(ElectionMessage::Proposal(running.local.clone()));
        }

        Ok(replies)
    }

    /// The discovery window closed. Without peers this device coordinates.
    pub fn discovery_timeout(&mut self) -> ElectionResult<Vec<ElectionMessage>> {
        match self.state.as_mut() {
            Some(running) if running.phase == DeviceState::Discovering => {
                if running.peers.is_empty() {
                    info!(token_id = %running.local.token_id, "no contenders, coordinating");
                    running.phase = DeviceState::Coordinator;
                    Ok(vec![ElectionMessage::Victory(running.local.clone())])
                } else {
                    running.phase = DeviceState::Electing;
                    Ok(vec![ElectionMessage::Proposal(running.local.clone())])
                }
            }
            _ => Ok(Vec::new()),
        }
    }

    /// The election window closed. The highest observed priority wins.
    pub fn election_timeout(&mut self) -> ElectionResult<Vec<ElectionMessage>> {
        let Some(running) = self.state.as_mut() else {
            return Ok(Vec::new());
        };
        if running.phase != DeviceState::Electing {
            return Ok(Vec::new());
        }

        let best_peer = running.peers.values().max_by(|a, b| a.priority.cmp(&b.priority));
        match best_peer {
            Some(best) if best.priority > running.local.priority => {
                running.leader = Some(best.clone());
                running.phase = DeviceState::Follower;
                Ok(Vec::new())
            }
            _ => {
                info!(token_id = %running.local.token_id, peers = running.peers.len(), "election won");
                running.phase = DeviceState::Coordinator;
                Ok(vec![ElectionMessage::Victory(running.local.clone())])
            }
        }
    }

    /// Abandons any running election and returns to IDLE.
    pub fn abandon(&mut self) {
        if let Some(running) = self.state.take()
            && running.phase.is_in_progress()
        {
            warn!(token_id = %running.local.token_id, phase = %running.phase, "election abandoned");
        }
    }

    /// Finishes a decided election, returning to IDLE with its outcome.
    pub fn complete(&mut self) -> ElectionResult<ElectionOutcome> {
        let outcome = self.outcome().ok_or(ElectionError::InvalidState {
            expected: "COORDINATOR or FOLLOWER",
            actual: self.state(),
        })?;
        self.state = None;
        Ok(outcome)
    }
}

/// Reply of a device that already holds the binding for `holder.token_id`.
///
/// Works without a running election: a `Discover` or `Proposal` for the
/// same token is answered with a `Victory` carrying the holder's priority.
#[must_use]
pub fn holder_reply(holder: &Candidate, message: &ElectionMessage) -> Option<ElectionMessage> {
    match message {
        ElectionMessage::Discover(peer) | ElectionMessage::Proposal(peer)
            if peer.token_id == holder.token_id && peer.nonce != holder.nonce =>
        {
            Some(ElectionMessage::Victory(holder.clone()))
        }
        _ => None,
    }
}
