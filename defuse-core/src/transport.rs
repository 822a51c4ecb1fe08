//! Datagram transport seam: fire-and-forget unicast/broadcast with explicit peer registration.
//! Delivery is at-most-once and unordered; the host implements this over its radio or socket.

use std::collections::VecDeque;

use tracing::debug;

use crate::identity::MacAddress;
use crate::protocol::Message;
use crate::wire::{self, EncodeError};

pub trait Transport {
    /// Make `peer` a legal unicast destination. Must succeed before `unicast` to that peer.
    fn register_peer(&mut self, peer: MacAddress) -> Result<(), TransportError>;

    /// Forget a previously registered peer. Unknown peers are ignored.
    fn unregister_peer(&mut self, peer: MacAddress);

    fn unicast(&mut self, peer: MacAddress, bytes: &[u8]) -> Result<(), TransportError>;

    fn broadcast(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0} is not registered")]
    NotRegistered(MacAddress),
    #[error("peer {0} cannot be registered")]
    RegistrationRejected(MacAddress),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode and unicast one message. Failures are logged and returned; nothing retries here.
pub(crate) fn unicast_message<T: Transport>(
    transport: &mut T,
    peer: MacAddress,
    msg: &Message,
) -> Result<(), TransportError> {
    let bytes = wire::encode_datagram(msg)?;
    transport.unicast(peer, &bytes).inspect_err(|e| {
        debug!(%peer, kind = ?msg.kind(), error = %e, "unicast failed");
    })
}

pub(crate) fn broadcast_message<T: Transport>(
    transport: &mut T,
    msg: &Message,
) -> Result<(), TransportError> {
    let bytes = wire::encode_datagram(msg)?;
    transport.broadcast(&bytes).inspect_err(|e| {
        debug!(kind = ?msg.kind(), error = %e, "broadcast failed");
    })
}

/// Datagrams received but not yet dispatched.
pub const INBOX_CAPACITY: usize = 64;

/// Inbound queue filled by the host's receive path and drained once per tick, so state is
/// only ever mutated from `tick()`. When full, the oldest datagram is dropped.
#[derive(Debug)]
pub(crate) struct Inbox {
    queue: VecDeque<(MacAddress, Vec<u8>)>,
    capacity: usize,
}

impl Inbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, source: MacAddress, bytes: &[u8]) {
        if self.queue.len() >= self.capacity {
            if let Some((dropped, _)) = self.queue.pop_front() {
                debug!(%dropped, "inbox full, dropping oldest datagram");
            }
        }
        self.queue.push_back((source, bytes.to_vec()));
    }

    pub(crate) fn drain(&mut self) -> Vec<(MacAddress, Vec<u8>)> {
        self.queue.drain(..).collect()
    }
}
