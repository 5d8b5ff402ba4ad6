//! Runs an election over a transport with real timers.

use crate::error::{ElectionError, ElectionResult};
use crate::machine::{holder_reply, DeviceState, ElectionMachine, ElectionOutcome};
use crate::protocol::{Candidate, ElectionMessage};
use crate::transport::ElectionTransport;
use decentri_types::TokenId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Timers and retry policy of an election run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionTimings {
    /// How long to wait for contenders after `Discover`.
    pub discovery_timeout_ms: u64,
    /// How long proposals are collected once a contender was seen.
    pub election_timeout_ms: u64,
    /// Retries for a failed broadcast.
    pub send_retries: u32,
    /// First retry delay; doubles per attempt.
    pub retry_backoff_ms: u64,
}

impl Default for ElectionTimings {
    fn default() -> Self {
        Self {
            discovery_timeout_ms: 1500,
            election_timeout_ms: 2000,
            send_retries: 3,
            retry_backoff_ms: 100,
        }
    }
}

impl ElectionTimings {
    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    #[must_use]
    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms)
    }

    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Returns the machine to IDLE if the run is dropped mid-election.
struct AbandonOnDrop<'a> {
    machine: &'a mut ElectionMachine,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.machine.state().is_in_progress() {
            self.machine.abandon();
        }
    }
}

/// Runs one election for `local` and leaves the machine in its decided state.
///
/// Without a transport, or when the initial `Discover` cannot be sent, the
/// device has no observable contenders and coordinates. The caller applies
/// the outcome and then calls [`ElectionMachine::complete`].
pub async fn run_election(
    machine: &mut ElectionMachine,
    transport: Option<&dyn ElectionTransport>,
    local: Candidate,
    timings: &ElectionTimings,
) -> ElectionResult<ElectionOutcome> {
    let guard = AbandonOnDrop { machine };
    let discover = guard.machine.begin(local)?;

    let transport = match transport {
        Some(t) if send_with_retry(t, &discover, timings).await => t,
        _ => {
            debug!("no reachable contenders, skipping discovery");
            guard.machine.discovery_timeout()?;
            return decided(guard.machine);
        }
    };

    collect(guard.machine, transport, DeviceState::Discovering, timings.discovery_timeout(), timings).await?;
    if guard.machine.state() == DeviceState::Discovering {
        let replies = guard.machine.discovery_timeout()?;
        send_all(transport, &replies, timings).await;
    }

    collect(guard.machine, transport, DeviceState::Electing, timings.election_timeout(), timings).await?;
    if guard.machine.state() == DeviceState::Electing {
        let replies = guard.machine.election_timeout()?;
        send_all(transport, &replies, timings).await;
    }

    decided(guard.machine)
}

/// Background task answering contenders for a token this device holds.
///
/// The task stops when the handle is dropped.
#[derive(Debug)]
pub struct HolderResponder {
    token_id: TokenId,
    task: JoinHandle<()>,
}

impl HolderResponder {
    /// Spawns the responder on the current tokio runtime.
    #[must_use]
    pub fn spawn(transport: Arc<dyn ElectionTransport>, holder: Candidate, timings: ElectionTimings) -> Self {
        info!(token_id = %holder.token_id, device_id = %holder.device_id(), "answering contenders as holder");
        Self {
            token_id: holder.token_id.clone(),
            task: tokio::spawn(async move { answer_contenders(transport.as_ref(), &holder, &timings).await }),
        }
    }

    #[must_use]
    pub fn token_id(&self) -> &TokenId {
        &self.token_id
    }

    /// Whether the task is still listening.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for HolderResponder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn answer_contenders(transport: &dyn ElectionTransport, holder: &Candidate, timings: &ElectionTimings) {
    loop {
        match transport.recv().await {
            Ok(message) => {
                if let Some(reply) = holder_reply(holder, &message) {
                    debug!(kind = message.kind(), "contender for held token, answering");
                    send_with_retry(transport, &reply, timings).await;
                }
            }
            Err(ElectionError::Codec(e)) => debug!(error = %e, "ignoring undecodable frame"),
            Err(e) => {
                warn!(error = %e, token_id = %holder.token_id, "holder responder stopped");
                return;
            }
        }
    }
}

fn decided(machine: &ElectionMachine) -> ElectionResult<ElectionOutcome> {
    machine.outcome().ok_or_else(|| ElectionError::InvalidState {
        expected: "COORDINATOR or FOLLOWER",
        actual: machine.state(),
    })
}

/// Feeds received messages to the machine while it stays in `phase`.
async fn collect(
    machine: &mut ElectionMachine,
    transport: &dyn ElectionTransport,
    phase: DeviceState,
    window: Duration,
    timings: &ElectionTimings,
) -> ElectionResult<()> {
    let deadline = Instant::now() + window;
    while machine.state() == phase {
        match timeout_at(deadline, transport.recv()).await {
            Err(_) => break,
            Ok(Ok(message)) => {
                let replies = machine.handle(&message)?;
                send_all(transport, &replies, timings).await;
            }
            Ok(Err(ElectionError::Codec(e))) => debug!(error = %e, "ignoring undecodable frame"),
            Ok(Err(e)) => {
                warn!(error = %e, %phase, "election receive failed, waiting out the window");
                tokio::time::sleep_until(deadline).await;
                break;
            }
        }
    }
    Ok(())
}

async fn send_all(transport: &dyn ElectionTransport, messages: &[ElectionMessage], timings: &ElectionTimings) {
    for message in messages {
        send_with_retry(transport, message, timings).await;
    }
}

/// Broadcasts with bounded exponential backoff. Returns whether it was sent.
async fn send_with_retry(
    transport: &dyn ElectionTransport,
    message: &ElectionMessage,
    timings: &ElectionTimings,
) -> bool {
    let mut backoff = timings.retry_backoff();
    for attempt in 0..=timings.send_retries {
        match transport.broadcast(message).await {
            Ok(()) => return true,
            Err(e) => {
                warn!(attempt, kind = message.kind(), error = %e, "election broadcast failed");
                if attempt < timings.send_retries {
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
    false
}
