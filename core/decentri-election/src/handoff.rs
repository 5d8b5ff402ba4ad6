//! Token hand-off between devices over TCP.
//!
//! The sender connects to the port a peer advertised in its candidate,
//! writes one `TokenTransfer` frame and waits for one `TokenAck` frame.

use crate::codec::{read_message, write_message};
use crate::error::{ElectionError, ElectionResult};
use crate::protocol::{ElectionMessage, TokenAck, TokenTransfer};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

/// Sends `transfer` to `addr` and returns the peer's acknowledgement.
pub async fn send_token(
    addr: SocketAddr,
    transfer: TokenTransfer,
    wait: Duration,
) -> ElectionResult<TokenAck> {
    let ack = timeout(wait, exchange(addr, transfer)).await.map_err(|_| ElectionError::Timeout)??;
    info!(%addr, token_id = %ack.token_id, accepted = ack.accepted, "token hand-off finished");
    Ok(ack)
}

async fn exchange(addr: SocketAddr, transfer: TokenTransfer) -> ElectionResult<TokenAck> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| ElectionError::Network(format!("connect to {addr} failed: {e}")))?;
    write_message(&mut stream, &ElectionMessage::TokenTransfer(transfer)).await?;
    match read_message(&mut stream).await? {
        ElectionMessage::TokenAck(ack) => Ok(ack),
        other => Err(ElectionError::Protocol(format!(
            "expected token_ack, got {}",
            other.kind()
        ))),
    }
}

/// Accepts token hand-offs from peers.
#[derive(Debug)]
pub struct HandoffListener {
    listener: TcpListener,
}

impl HandoffListener {
    /// Listens on `0.0.0.0:port`.
    pub async fn bind(port: u16) -> ElectionResult<Self> {
        Self::bind_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
    }

    pub async fn bind_addr(addr: SocketAddr) -> ElectionResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ElectionError::Network(format!("failed to bind TCP {addr}: {e}")))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> ElectionResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for the next peer and reads its transfer.
    pub async fn accept(&self) -> ElectionResult<IncomingHandoff> {
        let (mut stream, peer) = self.listener.accept().await?;
        match read_message(&mut stream).await? {
            ElectionMessage::TokenTransfer(transfer) => {
                debug!(%peer, token_id = %transfer.token_id, "token hand-off received");
                Ok(IncomingHandoff {
                    transfer,
                    peer,
                    stream,
                })
            }
            other => Err(ElectionError::Protocol(format!(
                "expected token_transfer, got {}",
                other.kind()
            ))),
        }
    }
}

/// A received transfer awaiting its acknowledgement.
#[derive(Debug)]
pub struct IncomingHandoff {
    pub transfer: TokenTransfer,
    pub peer: SocketAddr,
    stream: TcpStream,
}

impl IncomingHandoff {
    /// Accepts or refuses the transfer.
    pub async fn respond(mut self, ack: TokenAck) -> ElectionResult<()> {
        write_message(&mut self.stream, &ElectionMessage::TokenAck(ack)).await?;
        Ok(())
    }
}
