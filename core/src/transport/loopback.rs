//! In-process mesh used by the simulator and tests.
//!
//! Nodes join a shared `LoopbackMesh` and receive their `MeshEvent`s on a
//! tokio channel. Linking two nodes makes each one "find" the other;
//! resolution and sends only succeed across an existing link.

use super::abstraction::{MeshEvent, MeshTransport, PeerHandle, TransportError};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

struct NodeSlot {
    events: UnboundedSender<MeshEvent>,
    running: bool,
}

#[derive(Default)]
struct MeshInner {
    nodes: HashMap<PeerHandle, NodeSlot>,
    links: HashSet<(PeerHandle, PeerHandle)>,
}

fn link_key(a: &PeerHandle, b: &PeerHandle) -> (PeerHandle, PeerHandle) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// Shared radio neighbourhood for in-process nodes
#[derive(Clone, Default)]
pub struct LoopbackMesh {
    inner: Arc<RwLock<MeshInner>>,
}

impl LoopbackMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and hand back its transport and event stream
    pub fn join(&self, name: &str) -> (LoopbackTransport, UnboundedReceiver<MeshEvent>) {
        let (tx, rx) = unbounded_channel();
        let handle = PeerHandle::new(name);
        self.inner.write().nodes.insert(
            handle.clone(),
            NodeSlot {
                events: tx,
                running: false,
            },
        );
        (
            LoopbackTransport {
                local: handle,
                mesh: self.clone(),
            },
            rx,
        )
    }

    /// Bring two nodes into radio range of each other
    pub fn link(&self, a: &str, b: &str) {
        let a = PeerHandle::new(a);
        let b = PeerHandle::new(b);
        let mut inner = self.inner.write();
        if !inner.links.insert(link_key(&a, &b)) {
            return;
        }
        emit(
            &inner,
            &a,
            MeshEvent::PeerFound {
                peer: b.clone(),
                resolved: false,
            },
        );
        emit(
            &inner,
            &b,
            MeshEvent::PeerFound {
                peer: a,
                resolved: false,
            },
        );
    }

    /// Take two nodes out of range; both sides see the other as lost
    pub fn unlink(&self, a: &str, b: &str) {
        let a = PeerHandle::new(a);
        let b = PeerHandle::new(b);
        let mut inner = self.inner.write();
        if !inner.links.remove(&link_key(&a, &b)) {
            return;
        }
        emit(
            &inner,
            &a,
            MeshEvent::PeerLost {
                peer: b.clone(),
                reason: "out of range".to_string(),
            },
        );
        emit(
            &inner,
            &b,
            MeshEvent::PeerLost {
                peer: a,
                reason: "out of range".to_string(),
            },
        );
    }

    pub fn is_linked(&self, a: &PeerHandle, b: &PeerHandle) -> bool {
        self.inner.read().links.contains(&link_key(a, b))
    }
}

fn emit(inner: &MeshInner, to: &PeerHandle, event: MeshEvent) {
    if let Some(slot) = inner.nodes.get(to) {
        // Receiver dropped means the node shut down; nothing to deliver to.
        let _ = slot.events.send(event);
    }
}

/// One node's view of a `LoopbackMesh`
pub struct LoopbackTransport {
    local: PeerHandle,
    mesh: LoopbackMesh,
}

impl LoopbackTransport {
    pub fn local_handle(&self) -> &PeerHandle {
        &self.local
    }

    fn ensure_linked(&self, peer: &PeerHandle) -> Result<(), TransportError> {
        if self.mesh.is_linked(&self.local, peer) {
            Ok(())
        } else {
            Err(TransportError::PeerNotFound(peer.to_string()))
        }
    }

    fn ensure_running(&self) -> Result<(), TransportError> {
        let inner = self.mesh.inner.read();
        match inner.nodes.get(&self.local) {
            Some(slot) if slot.running => Ok(()),
            _ => Err(TransportError::NotAvailable(format!(
                "{} is not started",
                self.local
            ))),
        }
    }

    fn set_running(&self, running: bool) {
        if let Some(slot) = self.mesh.inner.write().nodes.get_mut(&self.local) {
            slot.running = running;
        }
    }
}

impl MeshTransport for LoopbackTransport {
    fn start(&self) -> Result<(), TransportError> {
        self.set_running(true);
        debug!("Loopback node {} started", self.local);
        Ok(())
    }

    fn stop(&self) {
        self.set_running(false);
        debug!("Loopback node {} stopped", self.local);
    }

    fn resolve(&self, peer: &PeerHandle) -> Result<(), TransportError> {
        self.ensure_running()?;
        self.ensure_linked(peer)
            .map_err(|e| TransportError::ResolveFailed(e.to_string()))?;
        emit(
            &self.mesh.inner.read(),
            &self.local,
            MeshEvent::PeerResolved { peer: peer.clone() },
        );
        Ok(())
    }

    fn send(&self, peer: &PeerHandle, data: Vec<u8>) -> Result<(), TransportError> {
        self.ensure_running()?;
        self.ensure_linked(peer)?;
        emit(
            &self.mesh.inner.read(),
            peer,
            MeshEvent::MessageReceived {
                peer: self.local.clone(),
                data,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_emits_found_on_both_sides() {
        let mesh = LoopbackMesh::new();
        let (a, mut a_rx) = mesh.join("a");
        let (_b, mut b_rx) = mesh.join("b");
        assert_eq!(a.local_handle(), &PeerHandle::new("a"));

        mesh.link("a", "b");

        assert_eq!(
            a_rx.try_recv().unwrap(),
            MeshEvent::PeerFound {
                peer: PeerHandle::new("b"),
                resolved: false
            }
        );
        assert_eq!(
            b_rx.try_recv().unwrap(),
            MeshEvent::PeerFound {
                peer: PeerHandle::new("a"),
                resolved: false
            }
        );
    }

    #[test]
    fn test_relinking_is_idempotent() {
        let mesh = LoopbackMesh::new();
        let (_a, mut a_rx) = mesh.join("a");
        let (_b, _b_rx) = mesh.join("b");

        mesh.link("a", "b");
        mesh.link("b", "a");

        assert!(a_rx.try_recv().is_ok());
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn test_send_requires_start_and_link() {
        let mesh = LoopbackMesh::new();
        let (a, _a_rx) = mesh.join("a");
        let (_b, mut b_rx) = mesh.join("b");
        let b = PeerHandle::new("b");

        assert!(matches!(
            a.send(&b, vec![1]),
            Err(TransportError::NotAvailable(_))
        ));

        a.start().unwrap();
        assert!(matches!(
            a.send(&b, vec![1]),
            Err(TransportError::PeerNotFound(_))
        ));

        mesh.link("a", "b");
        let _ = b_rx.try_recv();
        a.send(&b, vec![7, 8]).unwrap();
        assert_eq!(
            b_rx.try_recv().unwrap(),
            MeshEvent::MessageReceived {
                peer: PeerHandle::new("a"),
                data: vec![7, 8]
            }
        );
    }

    #[test]
    fn test_resolve_reports_back_to_caller() {
        let mesh = LoopbackMesh::new();
        let (a, mut a_rx) = mesh.join("a");
        let (_b, _b_rx) = mesh.join("b");
        a.start().unwrap();
        mesh.link("a", "b");
        let _ = a_rx.try_recv();

        a.resolve(&PeerHandle::new("b")).unwrap();
        assert_eq!(
            a_rx.try_recv().unwrap(),
            MeshEvent::PeerResolved {
                peer: PeerHandle::new("b")
            }
        );
    }

    #[test]
    fn test_unlink_emits_lost() {
        let mesh = LoopbackMesh::new();
        let (_a, mut a_rx) = mesh.join("a");
        let (_b, _b_rx) = mesh.join("b");
        mesh.link("a", "b");
        let _ = a_rx.try_recv();

        mesh.unlink("a", "b");
        assert!(matches!(
            a_rx.try_recv().unwrap(),
            MeshEvent::PeerLost { .. }
        ));
        assert!(!mesh.is_linked(&PeerHandle::new("a"), &PeerHandle::new("b")));
    }
}
