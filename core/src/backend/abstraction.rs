//! Chat backend abstraction
//!
//! The bridge never talks to a chat SDK directly. An adapter implements
//! `ChatBackend` for outbound calls and reports everything that happens
//! later (joins, deliveries, send completions, failures) as `BackendEvent`s.

use crate::message::{RelayMessage, VendorIdentity};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Handle to a joined backend channel.
///
/// Each provisioned chat client gets its own handle, so `client` records
/// which vendor identity the session was opened for and `member` the
/// display identity the backend assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHandle {
    /// Channel name, e.g. "general"
    pub name: String,
    /// Vendor identity the client session belongs to
    pub client: VendorIdentity,
    /// Display identity of that client on the backend
    pub member: String,
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} as {}", self.name, self.member)
    }
}

/// Events from the chat backend to the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A client provisioned for `on_behalf_of` joined `channel` as `identity`
    ChannelJoined {
        channel: ChannelHandle,
        on_behalf_of: VendorIdentity,
        identity: String,
    },
    /// A message was observed on the joined channel
    ChannelMessage(RelayMessage),
    /// Completion of an earlier `send_text`
    MessageSent(Result<(), BackendError>),
    /// Client provisioning or connection failed
    ConnectionFailed { reason: String },
}

/// Errors that can occur talking to the chat backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Access token fetch failed: {0}")]
    TokenFetch(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Outbound surface of a chat SDK adapter.
///
/// Both calls return as soon as the request is issued. Their outcome
/// arrives later as a `BackendEvent`.
#[cfg_attr(test, mockall::automock)]
pub trait ChatBackend: Send + Sync {
    /// Create a chat client for `identity` and join the configured channel
    fn provision_client(&self, identity: &VendorIdentity) -> Result<(), BackendError>;

    /// Post `text` through the client bound to `channel`
    fn send_text(&self, channel: &ChannelHandle, text: &str) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_handle_display() {
        let channel = ChannelHandle {
            name: "general".to_string(),
            client: VendorIdentity::new("P1"),
            member: "alice".to_string(),
        };
        assert_eq!(channel.to_string(), "#general as alice");
    }

    #[test]
    fn test_backend_error_display() {
        let error = BackendError::TokenFetch("timeout".to_string());
        assert!(error.to_string().contains("Access token fetch failed"));
    }
}
