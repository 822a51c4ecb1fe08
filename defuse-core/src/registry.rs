//! Peer registry (coordinator side): address -> module kind and per-peer acknowledgement flags.
//! Bounded; entries are never removed individually, only by `clear()` on game reset.

use std::collections::HashSet;

use crate::identity::MacAddress;
use crate::protocol::ModuleKind;

/// Maximum number of peripherals one coordinator tracks.
pub const MAX_MODULES: usize = 15;

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub address: MacAddress,
    pub kind: ModuleKind,
    pub started: bool,
    pub reset: bool,
    /// Only meaningful for puzzle modules.
    pub solved: bool,
    /// Correlation keys of solve attempts already applied for this peer.
    seen_attempts: HashSet<u32>,
}

impl PeerRecord {
    fn new(address: MacAddress, kind: ModuleKind) -> Self {
        Self {
            address,
            kind,
            started: false,
            reset: false,
            solved: false,
            seen_attempts: HashSet::new(),
        }
    }

    /// Record `key`; false if it was already seen (a duplicate delivery).
    pub fn first_delivery(&mut self, key: u32) -> bool {
        self.seen_attempts.insert(key)
    }
}

#[derive(Debug)]
pub struct PeerRegistry {
    peers: Vec<PeerRecord>,
    capacity: usize,
}

impl PeerRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            peers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a new peer. Addresses stay unique; a full registry rejects the peer.
    pub fn register(
        &mut self,
        address: MacAddress,
        kind: ModuleKind,
    ) -> Result<&mut PeerRecord, RegistryError> {
        if self.contains(&address) {
            return Err(RegistryError::AlreadyRegistered(address));
        }
        if self.is_full() {
            return Err(RegistryError::Full(self.capacity));
        }
        self.peers.push(PeerRecord::new(address, kind));
        let idx = self.peers.len() - 1;
        Ok(&mut self.peers[idx])
    }

    pub fn contains(&self, address: &MacAddress) -> bool {
        self.get(address).is_some()
    }

    pub fn get(&self, address: &MacAddress) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| p.address == *address)
    }

    pub fn get_mut(&mut self, address: &MacAddress) -> Option<&mut PeerRecord> {
        self.peers.iter_mut().find(|p| p.address == *address)
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.iter()
    }

    /// Remove every peer, returning their addresses for transport deregistration.
    pub fn clear(&mut self) -> Vec<MacAddress> {
        self.peers.drain(..).map(|p| p.address).collect()
    }

    pub fn all_started(&self) -> bool {
        self.peers.iter().all(|p| p.started)
    }

    pub fn all_reset(&self) -> bool {
        self.peers.iter().all(|p| p.reset)
    }

    /// True when every registered puzzle module is solved (vacuously true with none).
    pub fn all_puzzles_solved(&self) -> bool {
        self.puzzles().all(|p| p.solved)
    }

    pub fn count_kind(&self, kind: ModuleKind) -> usize {
        self.peers.iter().filter(|p| p.kind == kind).count()
    }

    pub fn solved_puzzles(&self) -> usize {
        self.puzzles().filter(|p| p.solved).count()
    }

    fn puzzles(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.iter().filter(|p| p.kind == ModuleKind::Puzzle)
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new(MAX_MODULES)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry full ({0} modules)")]
    Full(usize),
    #[error("peer {0} already registered")]
    AlreadyRegistered(MacAddress),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> MacAddress {
        MacAddress::new([0x02, 0, 0, 0, 0, n])
    }

    #[test]
    fn register_is_unique() {
        let mut r = PeerRegistry::new(4);
        r.register(mac(1), ModuleKind::Puzzle).unwrap();
        assert!(matches!(
            r.register(mac(1), ModuleKind::Needy),
            Err(RegistryError::AlreadyRegistered(_))
        ));
        assert_eq!(r.len(), 1);
        assert_eq!(r.get(&mac(1)).unwrap().kind, ModuleKind::Puzzle);
    }

    #[test]
    fn capacity_is_bounded() {
        let mut r = PeerRegistry::new(2);
        r.register(mac(1), ModuleKind::Puzzle).unwrap();
        r.register(mac(2), ModuleKind::Puzzle).unwrap();
        assert!(matches!(
            r.register(mac(3), ModuleKind::Puzzle),
            Err(RegistryError::Full(2))
        ));
        assert_eq!(r.len(), 2);
        assert!(!r.contains(&mac(3)));
    }

    #[test]
    fn default_capacity_is_max_modules() {
        let mut r = PeerRegistry::default();
        for n in 0..MAX_MODULES as u8 {
            r.register(mac(n), ModuleKind::Needy).unwrap();
        }
        assert!(r.is_full());
        assert!(r.register(mac(200), ModuleKind::Needy).is_err());
    }

    #[test]
    fn puzzle_quorum_ignores_other_kinds() {
        let mut r = PeerRegistry::new(4);
        assert!(r.all_puzzles_solved());
        r.register(mac(1), ModuleKind::Puzzle).unwrap();
        r.register(mac(2), ModuleKind::Needy).unwrap();
        assert!(!r.all_puzzles_solved());
        r.get_mut(&mac(1)).unwrap().solved = true;
        assert!(r.all_puzzles_solved());
        assert_eq!(r.solved_puzzles(), 1);
        assert_eq!(r.count_kind(ModuleKind::Needy), 1);
    }

    #[test]
    fn duplicate_attempt_keys_detected_per_peer() {
        let mut r = PeerRegistry::new(4);
        r.register(mac(1), ModuleKind::Puzzle).unwrap();
        r.register(mac(2), ModuleKind::Puzzle).unwrap();
        assert!(r.get_mut(&mac(1)).unwrap().first_delivery(5));
        assert!(!r.get_mut(&mac(1)).unwrap().first_delivery(5));
        assert!(r.get_mut(&mac(2)).unwrap().first_delivery(5));
    }

    #[test]
    fn clear_returns_addresses() {
        let mut r = PeerRegistry::new(4);
        r.register(mac(1), ModuleKind::Puzzle).unwrap();
        r.register(mac(2), ModuleKind::Spectator).unwrap();
        assert_eq!(r.clear(), vec![mac(1), mac(2)]);
        assert!(r.is_empty());
        assert!(r.all_started());
    }
}
