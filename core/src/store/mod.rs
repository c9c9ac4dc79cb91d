// Store module: in-memory bridge state (never persisted)

pub mod dedup;
pub mod registry;

pub use dedup::DedupCache;
pub use registry::PeerChannelRegistry;
