// MeshBridge Core: mesh ⇄ chat relay
//
// A device with no network access joins a chat room by relaying through a
// nearby mesh peer that has it. Everything here is transport-agnostic; the
// mesh and chat SDKs plug in through `MeshTransport` and `ChatBackend`.

pub mod backend;
pub mod bridge;
pub mod config;
pub mod message;
pub mod store;
pub mod transport;

use thiserror::Error;

pub use backend::{
    AccessTokenProvider, BackendError, BackendEvent, ChannelHandle, ChatBackend, ChatServer,
    HttpTokenProvider, MemoryChatBackend, StaticTokenProvider,
};
pub use bridge::{BridgeDelegate, BridgeNotification, ChannelDelegate, RelayCoordinator};
pub use config::{BridgeConfig, ConfigError};
pub use message::{MessageStatus, RelayMessage, VendorIdentity, WireError, WireMessage};
pub use store::{DedupCache, PeerChannelRegistry};
pub use transport::{
    LoopbackMesh, LoopbackTransport, MeshEvent, MeshTransport, PeerHandle, PeerState,
    TransportError,
};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Already running")]
    AlreadyRunning,
    #[error("Not running")]
    NotRunning,
    #[error("No route: no backend channel and no resolved proxy")]
    NoRoute,
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

// ============================================================================
// TRACING
// ============================================================================

/// Install the global fmt subscriber (idempotent).
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .try_init();
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing("debug");
        init_tracing("warn");
    }

    #[test]
    fn test_error_conversions() {
        let err: BridgeError = TransportError::NotAvailable("off".to_string()).into();
        assert!(matches!(err, BridgeError::Transport(_)));

        let err: BridgeError = WireError::MissingType.into();
        assert_eq!(err.to_string(), "Wire error: Missing type field");

        let err: BridgeError = ConfigError::EmptyChannel.into();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
