//! Property tests: no identity ever maps to a lost peer

use meshbridge_core::message::encode_wire;
use meshbridge_core::{
    BackendError, BridgeConfig, ChannelHandle, ChatBackend, MeshEvent, MeshTransport,
    PeerChannelRegistry, PeerHandle, PeerState, RelayCoordinator, TransportError, VendorIdentity,
    WireMessage,
};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Announce { identity: u8, peer: u8 },
    Lose { peer: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..6, 0u8..4).prop_map(|(identity, peer)| Op::Announce { identity, peer }),
        1 => (0u8..4).prop_map(|peer| Op::Lose { peer }),
    ]
}

fn peer(n: u8) -> PeerHandle {
    PeerHandle::new(format!("peer-{}", n))
}

fn identity(n: u8) -> VendorIdentity {
    VendorIdentity::new(format!("P{}", n))
}

struct NullTransport;

impl MeshTransport for NullTransport {
    fn start(&self) -> Result<(), TransportError> {
        Ok(())
    }
    fn stop(&self) {}
    fn resolve(&self, _peer: &PeerHandle) -> Result<(), TransportError> {
        Ok(())
    }
    fn send(&self, _peer: &PeerHandle, _data: Vec<u8>) -> Result<(), TransportError> {
        Ok(())
    }
}

struct NullBackend;

impl ChatBackend for NullBackend {
    fn provision_client(&self, _identity: &VendorIdentity) -> Result<(), BackendError> {
        Ok(())
    }
    fn send_text(&self, _channel: &ChannelHandle, _text: &str) -> Result<(), BackendError> {
        Ok(())
    }
}

proptest! {
    #[test]
    fn prop_registry_matches_model(ops in proptest::collection::vec(op_strategy(), 0..60)) {
        let mut registry = PeerChannelRegistry::new();
        let mut model: HashMap<VendorIdentity, PeerHandle> = HashMap::new();

        for op in ops {
            match op {
                Op::Announce { identity: i, peer: p } => {
                    registry.set_instance(identity(i), peer(p));
                    model.insert(identity(i), peer(p));
                }
                Op::Lose { peer: p } => {
                    let mut removed = registry.remove_instances_of(&peer(p));
                    let mut expected: Vec<_> = model
                        .iter()
                        .filter(|(_, handle)| **handle == peer(p))
                        .map(|(id, _)| id.clone())
                        .collect();
                    model.retain(|_, handle| *handle != peer(p));

                    removed.sort();
                    expected.sort();
                    prop_assert_eq!(removed, expected);
                    prop_assert!(registry.identities_for(&peer(p)).is_empty());
                }
            }
            prop_assert_eq!(registry.instance_count(), model.len());
        }
    }

    #[test]
    fn prop_coordinator_forgets_lost_peers(ops in proptest::collection::vec(op_strategy(), 0..60)) {
        let coordinator = RelayCoordinator::new(
            BridgeConfig::new("ME"),
            Arc::new(NullTransport),
            Arc::new(NullBackend),
        );

        for op in ops {
            match op {
                Op::Announce { identity: i, peer: p } => {
                    coordinator.handle_mesh_event(MeshEvent::PeerFound {
                        peer: peer(p),
                        resolved: true,
                    });
                    coordinator.handle_mesh_event(MeshEvent::MessageReceived {
                        peer: peer(p),
                        data: encode_wire(&WireMessage::announcement(identity(i), false)).unwrap(),
                    });
                    prop_assert_eq!(coordinator.instance_for(&identity(i)), Some(peer(p)));
                }
                Op::Lose { peer: p } => {
                    coordinator.handle_mesh_event(MeshEvent::PeerLost {
                        peer: peer(p),
                        reason: "out of range".to_string(),
                    });
                    prop_assert_eq!(coordinator.peer_state(&peer(p)), Some(PeerState::Lost));
                }
            }

            for (_, handle) in coordinator.instances() {
                prop_assert_ne!(coordinator.peer_state(&handle), Some(PeerState::Lost));
            }
        }
    }
}
