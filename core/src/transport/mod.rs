// Transport module: mesh SDK seam and the in-process loopback mesh

pub mod abstraction;
pub mod loopback;

pub use abstraction::{MeshEvent, MeshTransport, PeerHandle, PeerState, TransportError};
pub use loopback::{LoopbackMesh, LoopbackTransport};
