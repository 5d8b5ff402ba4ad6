//! Shared test helpers for election tests.

#![allow(dead_code)]

use decentri_election::{Candidate, ElectionTimings, Priority};
use decentri_types::{DeviceId, TokenId};

pub const PROPOSED_AT: i64 = 1_704_067_200_000;

pub fn token_id() -> TokenId {
    TokenId::parse("tok-election-1").unwrap()
}

pub fn priority(device: &str, holds_binding: bool, proposed_at: i64) -> Priority {
    Priority {
        holds_binding,
        device_id: DeviceId::parse(device).unwrap(),
        proposed_at,
    }
}

/// A candidate for the shared test token with a fixed nonce.
pub fn candidate(device: &str, nonce: u64) -> Candidate {
    Candidate {
        token_id: token_id(),
        priority: priority(device, false, PROPOSED_AT),
        nonce,
        tcp_port: 0,
    }
}

pub fn holder(device: &str, nonce: u64) -> Candidate {
    let mut c = candidate(device, nonce);
    c.priority.holds_binding = true;
    c
}

/// Short windows so paused-clock tests stay readable.
pub fn timings() -> ElectionTimings {
    ElectionTimings {
        discovery_timeout_ms: 200,
        election_timeout_ms: 300,
        send_retries: 2,
        retry_backoff_ms: 10,
    }
}
