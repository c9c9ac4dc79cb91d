// Peer/channel registry: which mesh peer and which backend channel stand
// for each vendor identity.
//
// Invariants:
// - an identity maps to a peer handle only while that peer is not lost
// - an identity maps to a channel only if a backend join succeeded for it

use crate::backend::ChannelHandle;
use crate::message::VendorIdentity;
use crate::transport::PeerHandle;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct PeerChannelRegistry {
    instances: BTreeMap<VendorIdentity, PeerHandle>,
    channels: HashMap<VendorIdentity, ChannelHandle>,
}

impl PeerChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `identity` to the peer currently representing it, replacing any
    /// previous handle.
    pub fn set_instance(&mut self, identity: VendorIdentity, peer: PeerHandle) {
        self.instances.insert(identity, peer);
    }

    /// Bind the backend channel joined on behalf of `identity`
    pub fn set_channel(&mut self, identity: VendorIdentity, channel: ChannelHandle) {
        self.channels.insert(identity, channel);
    }

    pub fn lookup_instance(&self, identity: &VendorIdentity) -> Option<&PeerHandle> {
        self.instances.get(identity)
    }

    pub fn lookup_channel(&self, identity: &VendorIdentity) -> Option<&ChannelHandle> {
        self.channels.get(identity)
    }

    /// Drop every identity that points at `peer`. Returns the identities removed.
    pub fn remove_instances_of(&mut self, peer: &PeerHandle) -> Vec<VendorIdentity> {
        let removed = self.identities_for(peer);
        for identity in &removed {
            self.instances.remove(identity);
        }
        removed
    }

    /// Snapshot of `identity → peer`, ordered by identity
    pub fn all_instances(&self) -> Vec<(VendorIdentity, PeerHandle)> {
        self.instances
            .iter()
            .map(|(identity, peer)| (identity.clone(), peer.clone()))
            .collect()
    }

    /// Identities currently represented by `peer`
    pub fn identities_for(&self, peer: &PeerHandle) -> Vec<VendorIdentity> {
        self.instances
            .iter()
            .filter(|(_, p)| *p == peer)
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Identities this process holds a backend channel for
    pub fn bound_identities(&self) -> Vec<VendorIdentity> {
        let mut identities: Vec<_> = self.channels.keys().cloned().collect();
        identities.sort();
        identities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_for(identity: &str) -> ChannelHandle {
        ChannelHandle {
            name: "general".to_string(),
            client: VendorIdentity::new(identity),
            member: identity.to_string(),
        }
    }

    #[test]
    fn test_set_and_lookup() {
        let mut registry = PeerChannelRegistry::new();
        let p1 = VendorIdentity::new("P1");
        registry.set_instance(p1.clone(), PeerHandle::new("peer-a"));
        registry.set_channel(p1.clone(), channel_for("P1"));

        assert_eq!(
            registry.lookup_instance(&p1),
            Some(&PeerHandle::new("peer-a"))
        );
        assert_eq!(registry.lookup_channel(&p1), Some(&channel_for("P1")));
        assert!(registry.lookup_instance(&VendorIdentity::new("P2")).is_none());
    }

    #[test]
    fn test_set_instance_replaces_handle() {
        let mut registry = PeerChannelRegistry::new();
        let p1 = VendorIdentity::new("P1");
        registry.set_instance(p1.clone(), PeerHandle::new("old"));
        registry.set_instance(p1.clone(), PeerHandle::new("new"));

        assert_eq!(registry.instance_count(), 1);
        assert_eq!(registry.lookup_instance(&p1), Some(&PeerHandle::new("new")));
    }

    #[test]
    fn test_remove_instances_of_removes_every_alias() {
        let mut registry = PeerChannelRegistry::new();
        let shared = PeerHandle::new("peer-a");
        registry.set_instance(VendorIdentity::new("P1"), shared.clone());
        registry.set_instance(VendorIdentity::new("P2"), shared.clone());
        registry.set_instance(VendorIdentity::new("P3"), PeerHandle::new("peer-b"));
        registry.set_channel(VendorIdentity::new("P1"), channel_for("P1"));

        let removed = registry.remove_instances_of(&shared);

        assert_eq!(
            removed,
            vec![VendorIdentity::new("P1"), VendorIdentity::new("P2")]
        );
        assert_eq!(registry.instance_count(), 1);
        // Channel bindings outlive the mesh peer
        assert_eq!(registry.bound_identities(), vec![VendorIdentity::new("P1")]);
    }

    #[test]
    fn test_all_instances_snapshot_is_ordered() {
        let mut registry = PeerChannelRegistry::new();
        registry.set_instance(VendorIdentity::new("b"), PeerHandle::new("2"));
        registry.set_instance(VendorIdentity::new("a"), PeerHandle::new("1"));

        let snapshot = registry.all_instances();
        assert_eq!(snapshot[0].0, VendorIdentity::new("a"));
        assert_eq!(snapshot[1].0, VendorIdentity::new("b"));
    }
}
