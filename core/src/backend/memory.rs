//! In-memory chat service used by the simulator and tests.
//!
//! `ChatServer` plays the hosted backend: named channels, registered display
//! names, and fan-out of every posted message to every subscribed client.
//! `MemoryChatBackend` is one process's adapter onto it. Like a real chat
//! SDK, a process that proxies for N identities holds N clients, so each
//! message on the channel reaches that process N times.

use super::abstraction::{BackendError, BackendEvent, ChannelHandle, ChatBackend};
use super::token::AccessTokenProvider;
use crate::message::{RelayMessage, VendorIdentity};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

struct Subscriber {
    client: VendorIdentity,
    events: UnboundedSender<BackendEvent>,
}

#[derive(Default)]
struct ServerInner {
    channels: HashMap<String, Vec<Subscriber>>,
    display_names: HashMap<VendorIdentity, String>,
    history: Vec<RelayMessage>,
}

/// Shared in-memory chat service
#[derive(Clone, Default)]
pub struct ChatServer {
    inner: Arc<Mutex<ServerInner>>,
}

impl ChatServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the display identity a device's client will join with
    pub fn register_user(&self, device: VendorIdentity, display_name: impl Into<String>) {
        self.inner
            .lock()
            .display_names
            .insert(device, display_name.into());
    }

    /// Display identity for `device`; falls back to the vendor identity
    pub fn display_name(&self, device: &VendorIdentity) -> String {
        self.inner
            .lock()
            .display_names
            .get(device)
            .cloned()
            .unwrap_or_else(|| device.to_string())
    }

    /// Join `channel_name`, creating it on first use
    pub fn join_or_create_channel(
        &self,
        channel_name: &str,
        client: &VendorIdentity,
        access_token: &str,
        events: UnboundedSender<BackendEvent>,
    ) -> Result<ChannelHandle, BackendError> {
        if access_token.is_empty() {
            return Err(BackendError::ConnectionFailed(
                "invalid access token".to_string(),
            ));
        }

        let member = self.display_name(client);
        let mut inner = self.inner.lock();
        let subscribers = inner.channels.entry(channel_name.to_string()).or_default();
        if subscribers.is_empty() {
            info!("Created channel #{}", channel_name);
        }
        subscribers.push(Subscriber {
            client: client.clone(),
            events,
        });

        Ok(ChannelHandle {
            name: channel_name.to_string(),
            client: client.clone(),
            member,
        })
    }

    /// Post as `channel.member`, fanning out to every subscriber.
    /// Returns the new message's sid.
    pub fn post(&self, channel: &ChannelHandle, text: &str) -> Result<String, BackendError> {
        let mut inner = self.inner.lock();
        let subscribers = inner
            .channels
            .get_mut(&channel.name)
            .ok_or_else(|| BackendError::ChannelUnavailable(channel.name.clone()))?;

        if !subscribers.iter().any(|s| s.client == channel.client) {
            return Err(BackendError::ChannelUnavailable(format!(
                "{} is not a member of #{}",
                channel.member, channel.name
            )));
        }

        let message = RelayMessage::new(uuid::Uuid::new_v4().to_string(), text, &channel.member);
        // Drop subscribers whose process has gone away.
        subscribers.retain(|s| {
            s.events
                .send(BackendEvent::ChannelMessage(message.clone()))
                .is_ok()
        });

        let sid = message.sid.clone();
        inner.history.push(message);
        Ok(sid)
    }

    /// Number of client sessions joined to `channel_name`
    pub fn member_count(&self, channel_name: &str) -> usize {
        self.inner
            .lock()
            .channels
            .get(channel_name)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Every message posted so far, oldest first
    pub fn history(&self) -> Vec<RelayMessage> {
        self.inner.lock().history.clone()
    }
}

/// One process's adapter onto a `ChatServer`
pub struct MemoryChatBackend {
    server: ChatServer,
    tokens: Arc<dyn AccessTokenProvider>,
    events: UnboundedSender<BackendEvent>,
    channel_name: String,
    online: bool,
}

impl MemoryChatBackend {
    pub fn new(
        server: ChatServer,
        tokens: Arc<dyn AccessTokenProvider>,
        channel_name: impl Into<String>,
        events: UnboundedSender<BackendEvent>,
    ) -> Self {
        Self {
            server,
            tokens,
            events,
            channel_name: channel_name.into(),
            online: true,
        }
    }

    /// A backend on a device with no network access: every call fails
    pub fn offline(
        server: ChatServer,
        tokens: Arc<dyn AccessTokenProvider>,
        channel_name: impl Into<String>,
        events: UnboundedSender<BackendEvent>,
    ) -> Self {
        Self {
            online: false,
            ..Self::new(server, tokens, channel_name, events)
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    fn emit(&self, event: BackendEvent) {
        if self.events.send(event).is_err() {
            debug!("Backend event dropped: bridge is gone");
        }
    }
}

impl ChatBackend for MemoryChatBackend {
    fn provision_client(&self, identity: &VendorIdentity) -> Result<(), BackendError> {
        if !self.online {
            debug!("No network access; cannot provision client for {}", identity);
            self.emit(BackendEvent::ConnectionFailed {
                reason: "error".to_string(),
            });
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BackendError::ConnectionFailed(e.to_string()))?;

        let server = self.server.clone();
        let tokens = Arc::clone(&self.tokens);
        let events = self.events.clone();
        let channel_name = self.channel_name.clone();
        let identity = identity.clone();

        runtime.spawn(async move {
            let joined = match tokens.fetch_token(&identity).await {
                Ok(token) => {
                    server.join_or_create_channel(&channel_name, &identity, &token, events.clone())
                }
                Err(e) => Err(e),
            };

            let event = match joined {
                Ok(channel) => {
                    info!("Client for {} joined {}", identity, channel);
                    BackendEvent::ChannelJoined {
                        identity: channel.member.clone(),
                        channel,
                        on_behalf_of: identity,
                    }
                }
                Err(e) => {
                    warn!("Error creating chat client for {}: {}", identity, e);
                    BackendEvent::ConnectionFailed {
                        reason: "error".to_string(),
                    }
                }
            };
            let _ = events.send(event);
        });

        Ok(())
    }

    fn send_text(&self, channel: &ChannelHandle, text: &str) -> Result<(), BackendError> {
        if !self.online {
            return Err(BackendError::SendFailed("no network access".to_string()));
        }

        let result = self.server.post(channel, text).map(|sid| {
            debug!("Posted {} to {}", sid, channel);
        });
        self.emit(BackendEvent::MessageSent(result));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::token::StaticTokenProvider;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_post_fans_out_to_every_client() {
        let server = ChatServer::new();
        let (tx, mut rx) = unbounded_channel();
        let own = server
            .join_or_create_channel("general", &VendorIdentity::new("A"), "t", tx.clone())
            .unwrap();
        server
            .join_or_create_channel("general", &VendorIdentity::new("B"), "t", tx)
            .unwrap();

        let sid = server.post(&own, "hi").unwrap();

        for _ in 0..2 {
            match rx.try_recv().unwrap() {
                BackendEvent::ChannelMessage(msg) => assert_eq!(msg.sid, sid),
                other => panic!("Wrong event type: {:?}", other),
            }
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(server.history().len(), 1);
    }

    #[test]
    fn test_display_name_falls_back_to_vendor_identity() {
        let server = ChatServer::new();
        server.register_user(VendorIdentity::new("P1"), "alice");
        assert_eq!(server.display_name(&VendorIdentity::new("P1")), "alice");
        assert_eq!(server.display_name(&VendorIdentity::new("P2")), "P2");
    }

    #[test]
    fn test_empty_token_rejected() {
        let server = ChatServer::new();
        let (tx, _rx) = unbounded_channel();
        assert!(server
            .join_or_create_channel("general", &VendorIdentity::new("A"), "", tx)
            .is_err());
    }

    #[test]
    fn test_offline_backend_reports_connection_failure() {
        let (tx, mut rx) = unbounded_channel();
        let backend = MemoryChatBackend::offline(
            ChatServer::new(),
            Arc::new(StaticTokenProvider::new("t")),
            "general",
            tx,
        );
        assert!(!backend.is_online());
        backend.provision_client(&VendorIdentity::new("A")).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            BackendEvent::ConnectionFailed {
                reason: "error".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_provisioning_joins_channel() {
        let server = ChatServer::new();
        server.register_user(VendorIdentity::new("A"), "alice");
        let (tx, mut rx) = unbounded_channel();
        let backend = MemoryChatBackend::new(
            server.clone(),
            Arc::new(StaticTokenProvider::new("t")),
            "general",
            tx,
        );

        backend.provision_client(&VendorIdentity::new("A")).unwrap();

        match rx.recv().await.unwrap() {
            BackendEvent::ChannelJoined {
                channel,
                on_behalf_of,
                identity,
            } => {
                assert_eq!(channel.name, "general");
                assert_eq!(on_behalf_of, VendorIdentity::new("A"));
                assert_eq!(identity, "alice");
            }
            other => panic!("Wrong event type: {:?}", other),
        }
        assert_eq!(server.member_count("general"), 1);
    }
}
