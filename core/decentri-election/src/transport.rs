//! Transport abstraction for election traffic.
//!
//! An election only needs best-effort broadcast to every device on the
//! segment and a stream of what the others broadcast.

use crate::error::ElectionResult;
use crate::protocol::ElectionMessage;
use async_trait::async_trait;

/// A broadcast medium shared by contending devices.
#[async_trait]
pub trait ElectionTransport: Send + Sync {
    /// Broadcasts a message to every listening device.
    async fn broadcast(&self, message: &ElectionMessage) -> ElectionResult<()>;

    /// Receives the next message. Transports may deliver our own broadcasts.
    ///
    /// Undecodable input is reported as [`crate::ElectionError::Codec`] and
    /// does not end the stream.
    async fn recv(&self) -> ElectionResult<ElectionMessage>;
}

/// In-memory transport for tests.
pub mod mock {
    use super::*;
    use crate::error::ElectionError;
    use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::{broadcast, Mutex};

    type Packet = (u64, ElectionMessage);

    /// A shared segment connecting [`MemoryTransport`] endpoints.
    #[derive(Debug, Clone)]
    pub struct MemoryHub {
        tx: broadcast::Sender<Packet>,
        next_id: Arc<AtomicU64>,
    }

    impl Default for MemoryHub {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MemoryHub {
        #[must_use]
        pub fn new() -> Self {
            let (tx, _) = broadcast::channel(256);
            Self {
                tx,
                next_id: Arc::new(AtomicU64::new(1)),
            }
        }

        /// Attaches a new endpoint. It sees messages sent after this call.
        #[must_use]
        pub fn endpoint(&self) -> MemoryTransport {
            MemoryTransport {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                tx: self.tx.clone(),
                rx: Mutex::new(self.tx.subscribe()),
                failing_sends: AtomicU32::new(0),
                sent: AtomicUsize::new(0),
            }
        }

        /// Injects a message as if a remote device had sent it.
        pub fn inject(&self, message: ElectionMessage) {
            let _ = self.tx.send((0, message));
        }
    }

    /// One device's view of a [`MemoryHub`].
    #[derive(Debug)]
    pub struct MemoryTransport {
        id: u64,
        tx: broadcast::Sender<Packet>,
        rx: Mutex<broadcast::Receiver<Packet>>,
        failing_sends: AtomicU32,
        sent: AtomicUsize,
    }

    impl MemoryTransport {
        /// Makes the next `count` broadcasts fail with a network error.
        pub fn fail_next_sends(&self, count: u32) {
            self.failing_sends.store(count, Ordering::SeqCst);
        }

        /// Number of successful broadcasts.
        #[must_use]
        pub fn sent_count(&self) -> usize {
            self.sent.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ElectionTransport for MemoryTransport {
        async fn broadcast(&self, message: &ElectionMessage) -> ElectionResult<()> {
            let failing = self
                .failing_sends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if failing.is_ok() {
                return Err(ElectionError::Network("simulated send failure".to_string()));
            }
            // No subscribers is not an error on a broadcast medium.
            let _ = self.tx.send((self.id, message.clone()));
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn recv(&self) -> ElectionResult<ElectionMessage> {
            let mut rx = self.rx.lock().await;
            loop {
                match rx.recv().await {
                    Ok((from, _)) if from == self.id => continue,
                    Ok((_, message)) => return Ok(message),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(ElectionError::ChannelClosed)
                    }
                }
            }
        }
    }
}
