//! LAN device election for DecentriLicense.
//!
//! When several devices activate the same token, exactly one of them binds
//! it. Devices broadcast their [`Priority`] on the local segment and a pure
//! [`ElectionMachine`] decides the winner; [`run_election`] drives it with
//! timers over any [`ElectionTransport`].

mod codec;
mod driver;
mod error;
mod handoff;
mod machine;
mod protocol;
pub mod transport;
mod udp;

pub use codec::{decode_frame, encode_frame, read_message, write_message, MAX_MESSAGE_SIZE};
pub use driver::{run_election, ElectionTimings, HolderResponder};
pub use error::{ElectionError, ElectionResult};
pub use handoff::{send_token, HandoffListener, IncomingHandoff};
pub use machine::{holder_reply, DeviceState, ElectionMachine, ElectionOutcome};
pub use protocol::{
    Candidate, ElectionMessage, Priority, TokenAck, TokenTransfer, DEFAULT_TCP_PORT,
    DEFAULT_UDP_PORT, PROTOCOL_VERSION,
};
pub use transport::ElectionTransport;
pub use udp::UdpTransport;
