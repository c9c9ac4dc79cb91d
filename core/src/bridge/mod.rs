// Bridge module: relay coordinator, peer lifecycle table and owner callbacks

pub mod coordinator;
pub mod delegate;
pub mod peers;

pub use coordinator::{RelayCoordinator, CONNECTIVITY_OFF};
pub use delegate::{BridgeDelegate, BridgeNotification, ChannelDelegate};
pub use peers::PeerTable;
