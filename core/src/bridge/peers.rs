// Peer table: lifecycle state of every mesh handle the bridge has heard of

use crate::transport::{PeerHandle, PeerState};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Lost handles remembered so their late frames can be dropped
pub const MAX_LOST_PEERS: usize = 1024;

#[derive(Debug)]
pub struct PeerTable {
    states: HashMap<PeerHandle, PeerState>,
    /// Lost handles, oldest first
    lost: VecDeque<PeerHandle>,
    lost_limit: usize,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::with_lost_limit(MAX_LOST_PEERS)
    }
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table that forgets the oldest lost handle once more than `limit` are held
    pub fn with_lost_limit(limit: usize) -> Self {
        Self {
            states: HashMap::new(),
            lost: VecDeque::new(),
            lost_limit: limit.max(1),
        }
    }

    /// Record a discovery. Returns true if this starts a new instance: the
    /// handle was unknown or its previous instance was lost.
    pub fn found(&mut self, peer: &PeerHandle) -> bool {
        match self.states.get(peer) {
            Some(PeerState::Found) | Some(PeerState::Resolved) => false,
            Some(PeerState::Lost) | None => {
                self.lost.retain(|p| p != peer);
                self.states.insert(peer.clone(), PeerState::Found);
                true
            }
        }
    }

    /// Mark `peer` addressable. Returns false for a lost peer, which stays lost.
    pub fn resolve(&mut self, peer: &PeerHandle) -> bool {
        match self.states.get(peer) {
            Some(PeerState::Lost) => false,
            _ => {
                self.states.insert(peer.clone(), PeerState::Resolved);
                true
            }
        }
    }

    pub fn lose(&mut self, peer: &PeerHandle) {
        if self.states.insert(peer.clone(), PeerState::Lost) == Some(PeerState::Lost) {
            return;
        }
        self.lost.push_back(peer.clone());

        while self.lost.len() > self.lost_limit {
            if let Some(old) = self.lost.pop_front() {
                self.states.remove(&old);
                debug!("Peer table full, forgot lost peer {}", old);
            }
        }
    }

    /// Number of handles in the table, lost ones included
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, peer: &PeerHandle) -> Option<PeerState> {
        self.states.get(peer).copied()
    }

    pub fn is_resolved(&self, peer: &PeerHandle) -> bool {
        self.state(peer) == Some(PeerState::Resolved)
    }

    pub fn is_lost(&self, peer: &PeerHandle) -> bool {
        self.state(peer) == Some(PeerState::Lost)
    }

    /// Every handle currently addressable, sorted
    pub fn resolved(&self) -> Vec<PeerHandle> {
        let mut peers: Vec<_> = self
            .states
            .iter()
            .filter(|(_, state)| **state == PeerState::Resolved)
            .map(|(peer, _)| peer.clone())
            .collect();
        peers.sort();
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found_resolved_lost() {
        let mut table = PeerTable::new();
        let peer = PeerHandle::new("peer-a");

        assert!(table.found(&peer));
        assert_eq!(table.state(&peer), Some(PeerState::Found));
        assert!(!table.is_resolved(&peer));

        assert!(table.resolve(&peer));
        assert!(table.is_resolved(&peer));

        table.lose(&peer);
        assert!(table.is_lost(&peer));
        assert!(!table.resolve(&peer));
        assert!(table.is_lost(&peer));
    }

    #[test]
    fn test_duplicate_found_keeps_resolution() {
        let mut table = PeerTable::new();
        let peer = PeerHandle::new("peer-a");
        table.found(&peer);
        table.resolve(&peer);

        assert!(!table.found(&peer));
        assert!(table.is_resolved(&peer));
    }

    #[test]
    fn test_rediscovery_after_loss_is_new_instance() {
        let mut table = PeerTable::new();
        let peer = PeerHandle::new("peer-a");
        table.found(&peer);
        table.lose(&peer);

        assert!(table.found(&peer));
        assert_eq!(table.state(&peer), Some(PeerState::Found));
    }

    #[test]
    fn test_resolved_listing() {
        let mut table = PeerTable::new();
        for name in ["c", "a", "b"] {
            table.found(&PeerHandle::new(name));
            table.resolve(&PeerHandle::new(name));
        }
        table.lose(&PeerHandle::new("b"));

        assert_eq!(
            table.resolved(),
            vec![PeerHandle::new("a"), PeerHandle::new("c")]
        );
    }

    #[test]
    fn test_lost_handles_are_bounded() {
        let mut table = PeerTable::with_lost_limit(2);
        for name in ["a", "b", "c"] {
            table.found(&PeerHandle::new(name));
            table.lose(&PeerHandle::new(name));
        }

        assert_eq!(table.len(), 2);
        assert_eq!(table.state(&PeerHandle::new("a")), None);
        assert!(table.is_lost(&PeerHandle::new("b")));
        assert!(table.is_lost(&PeerHandle::new("c")));
    }

    #[test]
    fn test_rediscovered_handle_leaves_lost_queue() {
        let mut table = PeerTable::with_lost_limit(1);
        let a = PeerHandle::new("a");
        table.found(&a);
        table.lose(&a);
        table.lose(&a);
        table.found(&a);
        table.resolve(&a);

        // Losing another handle must not evict the live one
        table.found(&PeerHandle::new("b"));
        table.lose(&PeerHandle::new("b"));

        assert!(table.is_resolved(&a));
        assert!(table.is_lost(&PeerHandle::new("b")));
    }
}
