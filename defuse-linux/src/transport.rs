//! LAN transport: the radio is emulated with one UDP multicast socket.
//!
//! Every frame is `source MAC (6 bytes) || datagram`. Broadcasts go to the multicast group;
//! unicasts go to the socket address a MAC was last heard from.

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard};

use defuse_core::identity::MAC_LEN;
use defuse_core::{MacAddress, Transport, TransportError};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// MAC -> last seen socket address, filled by the receive loop.
#[derive(Debug, Clone, Default)]
pub struct Routes(Arc<Mutex<HashMap<MacAddress, SocketAddr>>>);

impl Routes {
    fn lock(&self) -> MutexGuard<'_, HashMap<MacAddress, SocketAddr>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn learn(&self, mac: MacAddress, addr: SocketAddr) {
        self.lock().insert(mac, addr);
    }

    pub fn get(&self, mac: &MacAddress) -> Option<SocketAddr> {
        self.lock().get(mac).copied()
    }
}

pub async fn bind_multicast(port: u16, group: Ipv4Addr) -> std::io::Result<UdpSocket> {
    let std_sock = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
    std_sock.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    std_sock.set_multicast_ttl_v4(1)?;
    std_sock.set_nonblocking(true)?;
    UdpSocket::from_std(std_sock)
}

pub fn encode_frame(source: MacAddress, datagram: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MAC_LEN + datagram.len());
    frame.extend_from_slice(source.as_bytes());
    frame.extend_from_slice(datagram);
    frame
}

/// Split a frame into its source address and datagram. None if shorter than an address.
pub fn decode_frame(frame: &[u8]) -> Option<(MacAddress, &[u8])> {
    if frame.len() < MAC_LEN {
        return None;
    }
    let (mac, datagram) = frame.split_at(MAC_LEN);
    let bytes: [u8; MAC_LEN] = mac.try_into().ok()?;
    Some((MacAddress::new(bytes), datagram))
}

/// Non-blocking sender owned by the state machine. Sends never wait; a full socket buffer
/// is reported as a send failure, like a busy radio. The first sends after binding can fail
/// the same way until the runtime has seen the socket become writable; resends cover them.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local: MacAddress,
    group: SocketAddr,
    routes: Routes,
    registered: HashSet<MacAddress>,
}

impl UdpTransport {
    pub fn new(
        socket: Arc<UdpSocket>,
        local: MacAddress,
        group: Ipv4Addr,
        port: u16,
        routes: Routes,
    ) -> Self {
        Self {
            socket,
            local,
            group: SocketAddr::V4(SocketAddrV4::new(group, port)),
            routes,
            registered: HashSet::new(),
        }
    }
}

impl Transport for UdpTransport {
    /// Only addresses already heard from can be registered.
    fn register_peer(&mut self, peer: MacAddress) -> Result<(), TransportError> {
        if self.routes.get(&peer).is_none() {
            return Err(TransportError::RegistrationRejected(peer));
        }
        self.registered.insert(peer);
        Ok(())
    }

    fn unregister_peer(&mut self, peer: MacAddress) {
        self.registered.remove(&peer);
    }

    fn unicast(&mut self, peer: MacAddress, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.registered.contains(&peer) {
            return Err(TransportError::NotRegistered(peer));
        }
        let addr = self
            .routes
            .get(&peer)
            .ok_or(TransportError::NotRegistered(peer))?;
        self.socket.try_send_to(&encode_frame(self.local, bytes), addr)?;
        Ok(())
    }

    fn broadcast(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.socket
            .try_send_to(&encode_frame(self.local, bytes), self.group)?;
        Ok(())
    }
}

/// Receive frames, learn routes, and forward datagrams to the node task.
/// Returns when the node task has gone away.
pub async fn recv_loop(
    socket: Arc<UdpSocket>,
    local: MacAddress,
    routes: Routes,
    tx: mpsc::Sender<(MacAddress, Vec<u8>)>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; 2048];
    loop {
        let (n, from) = socket.recv_from(&mut buf).await?;
        let Some((source, datagram)) = decode_frame(&buf[..n]) else {
            trace!(%from, len = n, "runt frame");
            continue;
        };
        // Multicast loops our own frames back.
        if source == local {
            continue;
        }
        routes.learn(source, from);
        if tx.send((source, datagram.to_vec())).await.is_err() {
            debug!("node stopped, receive loop exiting");
            return Ok(());
        }
    }
}
