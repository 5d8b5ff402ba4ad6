//! Hash-chained, append-only usage ledger embedded in tokens.
//!
//! Entry `i` carries `seq == i` and the hash of entry `i - 1` (or the genesis
//! hash). The first entry is an `activate` entry that publishes the holder's
//! device key and is signed by it; every later entry is signed by the key of
//! the most recent `activate` entry. A later `activate` moves the binding to
//! a new device. The holder also signs the head (`state_signature`), which
//! makes cutting entries off the tail detectable.
//!
//! Appending never mutates a token. `extend` and `bind` return new tokens,
//! and `LedgerCursor` refuses to append from, or accept, a copy that is
//! behind the newest head this process has seen.

use crate::canonical::{entry_hash, genesis_hash, state_statement, usage_statement};
use crate::device::DeviceIdentity;
use crate::error::{LicenseError, LicenseResult};
use crate::token::{Token, UsageChainEntry};
use decentri_crypto::verify_device_signature;
use decentri_types::{DeviceId, TokenId};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Action name of binding entries.
pub const ACTIVATE_ACTION: &str = "activate";

/// Action name used when a usage event does not name one.
pub const DEFAULT_USAGE_ACTION: &str = "usage";

/// The device a ledger is currently bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub device_id: DeviceId,
    /// Base64 raw Ed25519 public key of the device.
    pub device_public_key: String,
}

/// Result of replaying a token's ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerState {
    /// Current holder, `None` for an unactivated token.
    pub binding: Option<Binding>,
    /// Hash the next entry must link to.
    pub head: String,
    /// Seq the next entry must carry.
    pub next_seq: u64,
}

impl LedgerState {
    /// Seq of the last entry, if any.
    #[must_use]
    pub fn last_seq(&self) -> Option<u64> {
        self.next_seq.checked_sub(1)
    }
}

fn binding_from_params(seq: u64, params: &Map<String, Value>) -> LicenseResult<Binding> {
    let field = |name: &str| {
        params
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| LicenseError::tampered(seq, format!("activation entry lacks `{name}`")))
    };
    let device_id = DeviceId::parse(field("device_id")?)
        .map_err(|e| LicenseError::tampered(seq, e.to_string()))?;
    Ok(Binding {
        device_id,
        device_public_key: field("device_public_key")?.to_string(),
    })
}

/// Replays the ledger of `token`, checking every link.
///
/// Fails with `LedgerTampered` naming the first entry that does not hold.
pub fn replay(token: &Token) -> LicenseResult<LedgerState> {
    let token_id = token.token_id();
    let chain = token.usage_chain();

    if chain.is_empty() {
        if token.is_bound() {
            return Err(LicenseError::tampered(0, "holder set without an activation entry"));
        }
        if token.state_index() != 0
            || !token.ledger_head().is_empty()
            || !token.state_signature().is_empty()
        {
            return Err(LicenseError::tampered(0, "ledger state set on an empty ledger"));
        }
        return Ok(LedgerState {
            binding: None,
            head: genesis_hash(token_id),
            next_seq: 0,
        });
    }

    let mut head = genesis_hash(token_id);
    let mut binding: Option<Binding> = None;

    for (index, entry) in chain.iter().enumerate() {
        let seq = entry.seq;
        if seq != index as u64 {
            return Err(LicenseError::tampered(
                seq,
                format!("entry at position {index} carries seq {seq}"),
            ));
        }
        if entry.hash_prev != head {
            return Err(LicenseError::tampered(seq, "hash link broken"));
        }

        let signer = if entry.action == ACTIVATE_ACTION {
            binding_from_params(seq, &entry.params)?
        } else {
            binding
                .clone()
                .ok_or_else(|| LicenseError::tampered(seq, "usage entry before activation"))?
        };

        let statement = usage_statement(
            token_id,
            seq,
            entry.time,
            &entry.action,
            &entry.params,
            &entry.hash_prev,
        )?;
        verify_device_signature(&signer.device_public_key, &statement, &entry.signature)
            .map_err(|_| LicenseError::tampered(seq, "entry signature does not verify"))?;

        binding = Some(signer);
        head = entry_hash(entry)?;
    }

    let last_seq = chain.len() as u64 - 1;
    let Some(binding) = binding else {
        return Err(LicenseError::tampered(0, "ledger has no activation entry"));
    };

    if token.state_index() != last_seq {
        return Err(LicenseError::tampered(
            last_seq,
            format!("state index {} does not match last entry", token.state_index()),
        ));
    }
    if token.ledger_head() != head {
        return Err(LicenseError::tampered(last_seq, "ledger head does not match last entry"));
    }
    if token.holder_device_id() != Some(&binding.device_id) {
        return Err(LicenseError::tampered(
            last_seq,
            "holder does not match the last activation",
        ));
    }
    let statement = state_statement(token_id, binding.device_id.as_str(), last_seq, &head)?;
    verify_device_signature(&binding.device_public_key, &statement, token.state_signature())
        .map_err(|_| LicenseError::tampered(last_seq, "state signature does not verify"))?;

    Ok(LedgerState {
        binding: Some(binding),
        head,
        next_seq: last_seq + 1,
    })
}

fn append_entry(
    token: &Token,
    state: &LedgerState,
    device: &DeviceIdentity,
    action: &str,
    params: Map<String, Value>,
    time: i64,
) -> LicenseResult<Token> {
    let token_id = token.token_id();
    let seq = state.next_seq;
    let statement = usage_statement(token_id, seq, time, action, &params, &state.head)?;
    let entry = UsageChainEntry {
        seq,
        time,
        action: action.to_string(),
        params,
        hash_prev: state.head.clone(),
        signature: device.sign_b64(&statement),
    };
    let head = entry_hash(&entry)?;
    let holder = device.device_id().clone();
    let state_signature =
        device.sign_b64(&state_statement(token_id, holder.as_str(), seq, &head)?);

    debug!(token_id = %token_id, seq, action, "appended ledger entry");
    Ok(token.with_ledger(entry, holder, head, state_signature))
}

/// Appends a usage entry signed by the bound device.
///
/// Fails with `NotBound` unless `device` holds the token's binding.
pub fn extend(
    token: &Token,
    device: &DeviceIdentity,
    action: &str,
    params: Map<String, Value>,
    time: i64,
) -> LicenseResult<Token> {
    if action.trim().is_empty() {
        return Err(LicenseError::InvalidArgument("action is empty".to_string()));
    }
    if action == ACTIVATE_ACTION {
        return Err(LicenseError::InvalidArgument(
            "activation entries are appended by binding".to_string(),
        ));
    }

    let state = replay(token)?;
    let binding = state
        .binding
        .as_ref()
        .ok_or_else(|| LicenseError::NotBound("token is not activated".to_string()))?;
    if &binding.device_id != device.device_id() {
        return Err(LicenseError::NotBound(format!(
            "token is held by device {}",
            binding.device_id
        )));
    }
    if binding.device_public_key != device.public_key_b64() {
        return Err(LicenseError::NotBound(
            "device key does not match the binding".to_string(),
        ));
    }

    append_entry(token, &state, device, action, params, time)
}

/// Binds `token` to `device` by appending an activation entry.
///
/// Binding to the device that already holds the token returns it unchanged.
pub fn bind(token: &Token, device: &DeviceIdentity, time: i64) -> LicenseResult<Token> {
    let state = replay(token)?;
    let public_key = device.public_key_b64();
    if let Some(binding) = &state.binding
        && &binding.device_id == device.device_id()
        && binding.device_public_key == public_key
    {
        return Ok(token.clone());
    }

    let mut params = Map::new();
    params.insert(
        "device_id".to_string(),
        Value::String(device.device_id().to_string()),
    );
    params.insert("device_public_key".to_string(), Value::String(public_key));
    append_entry(token, &state, device, ACTIVATE_ACTION, params, time)
}

/// A usage event as supplied by the application.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEvent {
    pub action: String,
    pub params: Map<String, Value>,
}

impl UsageEvent {
    /// Parses application usage JSON.
    ///
    /// An object with a string `action` uses it together with its `params`
    /// object. Any other object is recorded whole as the params of a
    /// `usage` action.
    pub fn from_json(json: &str) -> LicenseResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| LicenseError::InvalidArgument(format!("usage data is not JSON: {e}")))?;
        let Value::Object(mut object) = value else {
            return Err(LicenseError::InvalidArgument(
                "usage data must be a JSON object".to_string(),
            ));
        };

        match object.get("action").and_then(Value::as_str).map(str::to_string) {
            Some(action) => {
                let params = match object.remove("params") {
                    None | Some(Value::Null) => Map::new(),
                    Some(Value::Object(params)) => params,
                    Some(_) => {
                        return Err(LicenseError::InvalidArgument(
                            "`params` must be a JSON object".to_string(),
                        ));
                    }
                };
                Ok(Self { action, params })
            }
            None => Ok(Self {
                action: DEFAULT_USAGE_ACTION.to_string(),
                params: object,
            }),
        }
    }
}

/// Orders two snapshots of the same token by ledger progress.
///
/// The longer ledger wins; equal lengths fall back to the later issue time.
/// `Equal` does not imply identical ledgers, only equal precedence.
#[must_use]
pub fn compare_state_chains(new: &Token, current: &Token) -> Ordering {
    new.usage_chain()
        .len()
        .cmp(&current.usage_chain().len())
        .then(new.issue_time().cmp(&current.issue_time()))
}

/// Newest ledger head observed for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedHead {
    pub seq: u64,
    pub hash: String,
}

/// Tracks the newest ledger head seen per token so stale or forked copies
/// are rejected with `SequenceConflict`.
#[derive(Debug, Default)]
pub struct LedgerCursor {
    heads: HashMap<TokenId, ObservedHead>,
}

impl LedgerCursor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The newest head observed for `token_id`.
    #[must_use]
    pub fn observed(&self, token_id: &TokenId) -> Option<&ObservedHead> {
        self.heads.get(token_id)
    }

    /// Checks that `token` contains the observed head at its position.
    pub fn check(&self, token: &Token) -> LicenseResult<()> {
        let Some(observed) = self.heads.get(token.token_id()) else {
            return Ok(());
        };
        let entry = usize::try_from(observed.seq)
            .ok()
            .and_then(|i| token.usage_chain().get(i));
        match entry {
            None => Err(LicenseError::SequenceConflict {
                observed: observed.seq,
                reason: format!(
                    "token ledger ends at {:?}, behind the observed head",
                    token.last_seq()
                ),
            }),
            Some(entry) if entry_hash(entry)? != observed.hash => {
                Err(LicenseError::SequenceConflict {
                    observed: observed.seq,
                    reason: "token ledger forks from the observed head".to_string(),
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Records the head of `token` if it is ahead of what was observed.
    pub fn observe(&mut self, token: &Token) -> LicenseResult<()> {
        let Some(last) = token.usage_chain().last() else {
            return Ok(());
        };
        let ahead = self
            .heads
            .get(token.token_id())
            .is_none_or(|seen| last.seq > seen.seq);
        if ahead {
            self.heads.insert(
                token.token_id().clone(),
                ObservedHead {
                    seq: last.seq,
                    hash: entry_hash(last)?,
                },
            );
        }
        Ok(())
    }

    /// Appends a usage entry after checking `token` is not stale.
    pub fn append(
        &mut self,
        token: &Token,
        device: &DeviceIdentity,
        action: &str,
        params: Map<String, Value>,
        time: i64,
    ) -> LicenseResult<Token> {
        self.check(token)?;
        let next = extend(token, device, action, params, time)?;
        self.observe(&next)?;
        Ok(next)
    }

    /// Binds `token` to `device` after checking it is not stale.
    pub fn bind(
        &mut self,
        token: &Token,
        device: &DeviceIdentity,
        time: i64,
    ) -> LicenseResult<Token> {
        self.check(token)?;
        let next = bind(token, device, time)?;
        self.observe(&next)?;
        Ok(next)
    }

    /// Drops everything observed for `token_id`.
    pub fn forget(&mut self, token_id: &TokenId) {
        self.heads.remove(token_id);
    }
}
