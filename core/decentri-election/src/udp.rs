//! UDP broadcast transport for the local network segment.

use crate::codec::{decode_frame, encode_frame, MAX_MESSAGE_SIZE};
use crate::error::{ElectionError, ElectionResult};
use crate::protocol::ElectionMessage;
use crate::transport::ElectionTransport;
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::debug;

/// Broadcasts election frames to one UDP target and receives on its port.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpTransport {
    /// Binds `0.0.0.0:port` and broadcasts to `255.255.255.255:port`.
    pub async fn bind(port: u16) -> ElectionResult<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|e| ElectionError::Network(format!("failed to bind UDP port {port}: {e}")))?;
        socket
            .set_broadcast(true)
            .map_err(|e| ElectionError::Network(format!("failed to enable broadcast: {e}")))?;
        Ok(Self {
            socket,
            target: SocketAddr::from((Ipv4Addr::BROADCAST, port)),
        })
    }

    /// Binds `addr` and sends every frame to `target`.
    pub async fn bind_to(addr: SocketAddr, target: SocketAddr) -> ElectionResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| ElectionError::Network(format!("failed to bind {addr}: {e}")))?;
        Ok(Self { socket, target })
    }

    /// Changes the send target.
    pub fn set_target(&mut self, target: SocketAddr) {
        self.target = target;
    }

    pub fn local_addr(&self) -> ElectionResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl ElectionTransport for UdpTransport {
    async fn broadcast(&self, message: &ElectionMessage) -> ElectionResult<()> {
        let frame = encode_frame(message).map_err(|e| ElectionError::Codec(e.to_string()))?;
        self.socket
            .send_to(&frame, self.target)
            .await
            .map_err(|e| ElectionError::Network(format!("send to {} failed: {e}", self.target)))?;
        Ok(())
    }

    async fn recv(&self) -> ElectionResult<ElectionMessage> {
        let mut buf = vec![0u8; MAX_MESSAGE_SIZE.min(64 * 1024)];
        let (len, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| ElectionError::Network(e.to_string()))?;
        decode_frame(&buf[..len]).map_err(|e| {
            debug!(%from, error = %e, "dropping undecodable datagram");
            ElectionError::Codec(e.to_string())
        })
    }
}
