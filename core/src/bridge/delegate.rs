//! Outward notification surface of the bridge.
//!
//! The owner (UI, CLI, test harness) registers a `BridgeDelegate`. The
//! coordinator builds `BridgeNotification`s while holding its state lock and
//! delivers them after releasing it.

use crate::backend::ChannelHandle;
use crate::message::{MessageStatus, RelayMessage};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

/// Callback interface for bridge events
pub trait BridgeDelegate: Send + Sync {
    /// A backend channel was joined, for us or for a peer we proxy
    fn on_peer_joined_channel(&self, channel: ChannelHandle, identity: String);
    /// Outcome of a post to the backend
    fn on_message_sent(&self, status: MessageStatus);
    /// A chat message reached this device for the first time
    fn on_message_received(&self, message: RelayMessage);
    /// A proxy joined the backend on our behalf; every field of its
    /// `client` frame, including `type`
    fn on_joined_backend(&self, fields: BTreeMap<String, String>);
    /// Backend provisioning or connection failed
    fn on_connection_failed(&self, reason: String);
    /// No mesh route and no backend channel remain
    fn on_lost_connectivity(&self, status: String);
}

/// A single pending delegate call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeNotification {
    PeerJoinedChannel {
        channel: ChannelHandle,
        identity: String,
    },
    MessageSent(MessageStatus),
    MessageReceived(RelayMessage),
    JoinedBackend(BTreeMap<String, String>),
    ConnectionFailed(String),
    LostConnectivity(String),
}

impl BridgeNotification {
    pub fn deliver(self, delegate: &dyn BridgeDelegate) {
        match self {
            BridgeNotification::PeerJoinedChannel { channel, identity } => {
                delegate.on_peer_joined_channel(channel, identity)
            }
            BridgeNotification::MessageSent(status) => delegate.on_message_sent(status),
            BridgeNotification::MessageReceived(message) => delegate.on_message_received(message),
            BridgeNotification::JoinedBackend(fields) => delegate.on_joined_backend(fields),
            BridgeNotification::ConnectionFailed(reason) => delegate.on_connection_failed(reason),
            BridgeNotification::LostConnectivity(status) => delegate.on_lost_connectivity(status),
        }
    }
}

impl fmt::Display for BridgeNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeNotification::PeerJoinedChannel { channel, identity } => {
                write!(f, "{} joined {}", identity, channel)
            }
            BridgeNotification::MessageSent(status) => write!(f, "message sent: {}", status),
            BridgeNotification::MessageReceived(message) => {
                write!(f, "<{}> {}", message.author, message.body)
            }
            BridgeNotification::JoinedBackend(fields) => {
                let identity = fields.get("identity").map(String::as_str).unwrap_or("?");
                write!(f, "joined backend as {}", identity)
            }
            BridgeNotification::ConnectionFailed(reason) => {
                write!(f, "connection failed: {}", reason)
            }
            BridgeNotification::LostConnectivity(status) => {
                write!(f, "connectivity: {}", status)
            }
        }
    }
}

/// Delegate that forwards every notification into a channel
#[derive(Debug, Clone)]
pub struct ChannelDelegate {
    tx: UnboundedSender<BridgeNotification>,
}

impl ChannelDelegate {
    pub fn new(tx: UnboundedSender<BridgeNotification>) -> Self {
        Self { tx }
    }

    fn forward(&self, notification: BridgeNotification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification dropped: receiver closed");
        }
    }
}

impl BridgeDelegate for ChannelDelegate {
    fn on_peer_joined_channel(&self, channel: ChannelHandle, identity: String) {
        self.forward(BridgeNotification::PeerJoinedChannel { channel, identity });
    }

    fn on_message_sent(&self, status: MessageStatus) {
        self.forward(BridgeNotification::MessageSent(status));
    }

    fn on_message_received(&self, message: RelayMessage) {
        self.forward(BridgeNotification::MessageReceived(message));
    }

    fn on_joined_backend(&self, fields: BTreeMap<String, String>) {
        self.forward(BridgeNotification::JoinedBackend(fields));
    }

    fn on_connection_failed(&self, reason: String) {
        self.forward(BridgeNotification::ConnectionFailed(reason));
    }

    fn on_lost_connectivity(&self, status: String) {
        self.forward(BridgeNotification::LostConnectivity(status));
    }
}
