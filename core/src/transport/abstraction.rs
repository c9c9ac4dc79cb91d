//! Transport abstraction layer for the mesh side of the bridge
//!
//! Defines the peer handle, the events a mesh SDK adapter feeds into the
//! bridge, and the narrow send/resolve surface the bridge calls back into.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque handle to a mesh endpoint, as issued by the mesh SDK.
///
/// A handle is only meaningful for the session that produced it; the
/// stable identity of a device is its `VendorIdentity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerHandle(String);

impl PeerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a peer instance. `Lost` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerState {
    /// Discovered but not yet addressable
    Found,
    /// Addressable for sending
    Resolved,
    /// Gone for good
    Lost,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerState::Found => write!(f, "Found"),
            PeerState::Resolved => write!(f, "Resolved"),
            PeerState::Lost => write!(f, "Lost"),
        }
    }
}

/// Events from the mesh transport to the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    /// A peer was discovered. `resolved` is set when the SDK already
    /// reports the instance as addressable.
    PeerFound { peer: PeerHandle, resolved: bool },
    /// A previously found peer became addressable
    PeerResolved { peer: PeerHandle },
    /// A peer disappeared
    PeerLost { peer: PeerHandle, reason: String },
    /// Raw frame received from a peer
    MessageReceived { peer: PeerHandle, data: Vec<u8> },
}

impl MeshEvent {
    pub fn peer(&self) -> &PeerHandle {
        match self {
            MeshEvent::PeerFound { peer, .. }
            | MeshEvent::PeerResolved { peer }
            | MeshEvent::PeerLost { peer, .. }
            | MeshEvent::MessageReceived { peer, .. } => peer,
        }
    }
}

impl fmt::Display for MeshEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshEvent::PeerFound { peer, resolved } => {
                write!(f, "PeerFound {{ peer: {}, resolved: {} }}", peer, resolved)
            }
            MeshEvent::PeerResolved { peer } => write!(f, "PeerResolved {{ peer: {} }}", peer),
            MeshEvent::PeerLost { peer, reason } => {
                write!(f, "PeerLost {{ peer: {}, reason: {} }}", peer, reason)
            }
            MeshEvent::MessageReceived { peer, data } => write!(
                f,
                "MessageReceived {{ peer: {}, data_len: {} }}",
                peer,
                data.len()
            ),
        }
    }
}

/// Errors that can occur in the mesh transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Transport not available: {0}")]
    NotAvailable(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Resolve failed: {0}")]
    ResolveFailed(String),
}

/// Outbound surface of a mesh SDK adapter.
///
/// All calls are fire-and-forget: a successful return means the frame was
/// handed to the SDK, not that the peer received it.
#[cfg_attr(test, mockall::automock)]
pub trait MeshTransport: Send + Sync {
    /// Begin advertising and browsing for peers
    fn start(&self) -> Result<(), TransportError>;

    /// Stop all mesh activity
    fn stop(&self);

    /// Ask the SDK to make a found peer addressable
    fn resolve(&self, peer: &PeerHandle) -> Result<(), TransportError>;

    /// Send an opaque frame to a resolved peer
    fn send(&self, peer: &PeerHandle, data: Vec<u8>) -> Result<(), TransportError>;
}
