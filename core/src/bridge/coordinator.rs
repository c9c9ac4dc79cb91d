//! Relay coordinator: the mesh ⇄ chat protocol engine.
//!
//! Consumes `MeshEvent`s and `BackendEvent`s, keeps the registry, dedup
//! cache and peer table up to date, and issues sends back out through the
//! transport and backend adapters.
//!
//! All bridge state sits behind one mutex. Handlers decide what to do while
//! holding it and return a list of `Action`s, which are executed after the
//! lock is released. Adapters and the delegate are therefore free to call
//! back into the coordinator from inside a send.

use super::delegate::{BridgeDelegate, BridgeNotification};
use super::peers::PeerTable;
use crate::backend::{BackendEvent, ChannelHandle, ChatBackend};
use crate::config::BridgeConfig;
use crate::message::{
    decode_wire, encode_wire, MessageStatus, RelayMessage, VendorIdentity, WireMessage,
};
use crate::store::{DedupCache, PeerChannelRegistry};
use crate::transport::{MeshEvent, MeshTransport, PeerHandle, PeerState};
use crate::BridgeError;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Status reported to the owner when neither a mesh route nor a backend
/// channel is left
pub const CONNECTIVITY_OFF: &str = "off";

struct BridgeState {
    registry: PeerChannelRegistry,
    dedup: DedupCache,
    peers: PeerTable,
    has_backend_access: bool,
}

/// Outbound work decided under the state lock
enum Action {
    Mesh(PeerHandle, WireMessage),
    Resolve(PeerHandle),
    Provision(VendorIdentity),
    Post(ChannelHandle, String),
    Notify(BridgeNotification),
}

pub struct RelayCoordinator {
    config: BridgeConfig,
    own_identity: VendorIdentity,
    transport: Arc<dyn MeshTransport>,
    backend: Arc<dyn ChatBackend>,
    state: Mutex<BridgeState>,
    delegate: RwLock<Option<Arc<dyn BridgeDelegate>>>,
    running: RwLock<bool>,
}

impl RelayCoordinator {
    pub fn new(
        config: BridgeConfig,
        transport: Arc<dyn MeshTransport>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        let dedup = match config.dedup_capacity {
            Some(capacity) => DedupCache::with_capacity_limit(capacity),
            None => DedupCache::new(),
        };

        Self {
            own_identity: config.vendor_identity.clone(),
            state: Mutex::new(BridgeState {
                registry: PeerChannelRegistry::new(),
                dedup,
                peers: PeerTable::new(),
                has_backend_access: config.announce_backend_access,
            }),
            config,
            transport,
            backend,
            delegate: RwLock::new(None),
            running: RwLock::new(false),
        }
    }

    /// Register (or with `None`, unregister) the owner's callbacks
    pub fn set_delegate(&self, delegate: Option<Arc<dyn BridgeDelegate>>) {
        *self.delegate.write() = delegate;
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn own_identity(&self) -> &VendorIdentity {
        &self.own_identity
    }

    // ------------------------------------------------------------------------
    // LIFECYCLE
    // ------------------------------------------------------------------------

    /// Start the mesh transport and provision our own chat client
    pub fn start(&self) -> Result<(), BridgeError> {
        {
            let mut running = self.running.write();
            if *running {
                return Err(BridgeError::AlreadyRunning);
            }
            *running = true;
        }

        info!("Bridge {} starting...", self.own_identity);
        if let Err(e) = self.transport.start() {
            *self.running.write() = false;
            return Err(e.into());
        }

        self.execute(vec![Action::Provision(self.own_identity.clone())]);
        info!("Bridge {} started", self.own_identity);
        Ok(())
    }

    pub fn stop(&self) {
        {
            let mut running = self.running.write();
            if !*running {
                return;
            }
            *running = false;
        }

        info!("Bridge {} stopping...", self.own_identity);
        self.transport.stop();
        info!("Bridge {} stopped", self.own_identity);
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Current value of the `hasBackendAccess` flag we announce
    pub fn has_backend_access(&self) -> bool {
        self.state.lock().has_backend_access
    }

    /// Override the announced flag; affects announcements sent from now on
    pub fn set_backend_access(&self, has_backend_access: bool) {
        self.state.lock().has_backend_access = has_backend_access;
    }

    // ------------------------------------------------------------------------
    // LOCAL USER
    // ------------------------------------------------------------------------

    /// Send chat text from the local user.
    ///
    /// Posts directly when we hold our own backend channel; otherwise asks a
    /// randomly chosen resolved peer to post on our behalf.
    pub fn send_text(&self, text: &str) -> Result<(), BridgeError> {
        if !self.is_running() {
            return Err(BridgeError::NotRunning);
        }

        enum Route {
            Direct(ChannelHandle),
            Proxy(PeerHandle),
        }

        let route = {
            let state = self.state.lock();
            match state.registry.lookup_channel(&self.own_identity) {
                Some(channel) => Route::Direct(channel.clone()),
                None => {
                    let candidates: Vec<PeerHandle> = state
                        .registry
                        .all_instances()
                        .into_iter()
                        .map(|(_, peer)| peer)
                        .filter(|peer| state.peers.is_resolved(peer))
                        .collect();
                    match candidates.choose(&mut rand::thread_rng()) {
                        Some(peer) => Route::Proxy(peer.clone()),
                        None => {
                            warn!("No backend channel and no resolved proxy; message not sent");
                            return Err(BridgeError::NoRoute);
                        }
                    }
                }
            }
        };

        match route {
            Route::Direct(channel) => {
                if let Err(e) = self.backend.send_text(&channel, text) {
                    warn!("Backend send failed on {}: {}", channel, e);
                    self.notify(BridgeNotification::MessageSent(MessageStatus::Error));
                    return Err(e.into());
                }
            }
            Route::Proxy(peer) => {
                debug!("Relaying outgoing message through {}", peer);
                let frame = WireMessage::send(text, self.own_identity.clone());
                self.send_frame(&peer, &frame)?;
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // MESH EVENTS
    // ------------------------------------------------------------------------

    pub fn handle_mesh_event(&self, event: MeshEvent) {
        debug!("Mesh event: {}", event);
        let actions = {
            let mut state = self.state.lock();
            match event {
                MeshEvent::PeerFound { peer, resolved } => {
                    self.on_peer_found(&mut state, peer, resolved)
                }
                MeshEvent::PeerResolved { peer } => self.on_peer_resolved(&mut state, peer),
                MeshEvent::PeerLost { peer, reason } => self.on_peer_lost(&mut state, peer, &reason),
                MeshEvent::MessageReceived { peer, data } => {
                    self.on_frame(&mut state, peer, &data)
                }
            }
        };
        self.execute(actions);
    }

    fn on_peer_found(&self, state: &mut BridgeState, peer: PeerHandle, resolved: bool) -> Vec<Action> {
        if state.peers.found(&peer) {
            info!("Found peer {}", peer);
        }

        if resolved {
            self.on_peer_resolved(state, peer)
        } else {
            vec![Action::Resolve(peer)]
        }
    }

    fn on_peer_resolved(&self, state: &mut BridgeState, peer: PeerHandle) -> Vec<Action> {
        if !state.peers.resolve(&peer) {
            debug!("Ignoring resolution of lost peer {}", peer);
            return Vec::new();
        }

        info!("Resolved peer {}", peer);
        let announcement =
            WireMessage::announcement(self.own_identity.clone(), state.has_backend_access);
        vec![Action::Mesh(peer, announcement)]
    }

    fn on_peer_lost(&self, state: &mut BridgeState, peer: PeerHandle, reason: &str) -> Vec<Action> {
        state.peers.lose(&peer);
        let removed = state.registry.remove_instances_of(&peer);
        info!(
            "Lost peer {} ({}); dropped {} identities",
            peer,
            reason,
            removed.len()
        );

        if state.registry.instance_count() == 0
            && state.registry.lookup_channel(&self.own_identity).is_none()
        {
            return vec![Action::Notify(BridgeNotification::LostConnectivity(
                CONNECTIVITY_OFF.to_string(),
            ))];
        }
        Vec::new()
    }

    fn on_frame(&self, state: &mut BridgeState, peer: PeerHandle, data: &[u8]) -> Vec<Action> {
        if state.peers.state(&peer) == Some(PeerState::Lost) {
            debug!("Dropping frame from lost peer {}", peer);
            return Vec::new();
        }

        let frame = match decode_wire(data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Dropping frame from {}: {}", peer, e);
                return Vec::new();
            }
        };

        match frame {
            WireMessage::Announcement {
                vendor_identifier,
                has_backend_access: true,
            } => {
                debug!("{} ({}) announced backend access", vendor_identifier, peer);
                Vec::new()
            }
            WireMessage::Announcement {
                vendor_identifier,
                has_backend_access: false,
            } => {
                info!("{} ({}) needs a proxy", vendor_identifier, peer);
                state
                    .registry
                    .set_instance(vendor_identifier.clone(), peer.clone());

                match state.registry.lookup_channel(&vendor_identifier) {
                    // Already joined for this device in an earlier session
                    Some(channel) => vec![Action::Mesh(
                        peer,
                        WireMessage::client(channel.member.clone()),
                    )],
                    None => vec![Action::Provision(vendor_identifier)],
                }
            }
            WireMessage::Client { identity, extra } => {
                info!("Peer {} joined the backend for us as {}", peer, identity);
                let mut fields: BTreeMap<String, String> = extra;
                fields.insert("type".to_string(), "client".to_string());
                fields.insert("identity".to_string(), identity);
                vec![Action::Notify(BridgeNotification::JoinedBackend(fields))]
            }
            WireMessage::Send {
                message,
                identifier_for_vendor,
            } => match state.registry.lookup_channel(&identifier_for_vendor) {
                Some(channel) => vec![Action::Post(channel.clone(), message)],
                None => {
                    warn!(
                        "No channel bound for {}; cannot post relayed message",
                        identifier_for_vendor
                    );
                    vec![Action::Notify(BridgeNotification::MessageSent(
                        MessageStatus::Error,
                    ))]
                }
            },
            WireMessage::Receive(message) => relay_chat_message(state, message, Some(&peer)),
        }
    }

    // ------------------------------------------------------------------------
    // BACKEND EVENTS
    // ------------------------------------------------------------------------

    pub fn handle_backend_event(&self, event: BackendEvent) {
        let actions = {
            let mut state = self.state.lock();
            match event {
                BackendEvent::ChannelJoined {
                    channel,
                    on_behalf_of,
                    identity,
                } => self.on_channel_joined(&mut state, channel, on_behalf_of, identity),
                BackendEvent::ChannelMessage(message) => {
                    relay_chat_message(&mut state, message, None)
                }
                BackendEvent::MessageSent(Ok(())) => vec![Action::Notify(
                    BridgeNotification::MessageSent(MessageStatus::Success),
                )],
                BackendEvent::MessageSent(Err(e)) => {
                    warn!("Backend send failed: {}", e);
                    vec![Action::Notify(BridgeNotification::MessageSent(
                        MessageStatus::Error,
                    ))]
                }
                BackendEvent::ConnectionFailed { reason } => {
                    connection_failed(&mut state, reason)
                }
            }
        };
        self.execute(actions);
    }

    fn on_channel_joined(
        &self,
        state: &mut BridgeState,
        channel: ChannelHandle,
        on_behalf_of: VendorIdentity,
        identity: String,
    ) -> Vec<Action> {
        info!("Joined {} on behalf of {}", channel, on_behalf_of);
        state
            .registry
            .set_channel(on_behalf_of.clone(), channel.clone());

        let mut actions = vec![Action::Notify(BridgeNotification::PeerJoinedChannel {
            channel,
            identity: identity.clone(),
        })];

        if on_behalf_of != self.own_identity {
            match state.registry.lookup_instance(&on_behalf_of) {
                Some(peer) => actions.push(Action::Mesh(peer.clone(), WireMessage::client(identity))),
                None => debug!("{} is no longer on the mesh; client frame dropped", on_behalf_of),
            }
        }

        actions
    }

    // ------------------------------------------------------------------------
    // EVENT PUMP
    // ------------------------------------------------------------------------

    /// Drain both event streams until each has been closed
    pub async fn run(
        &self,
        mut mesh_events: UnboundedReceiver<MeshEvent>,
        mut backend_events: UnboundedReceiver<BackendEvent>,
    ) {
        loop {
            tokio::select! {
                Some(event) = mesh_events.recv() => self.handle_mesh_event(event),
                Some(event) = backend_events.recv() => self.handle_backend_event(event),
                else => break,
            }
        }
        debug!("Bridge {} event streams closed", self.own_identity);
    }

    // ------------------------------------------------------------------------
    // SNAPSHOTS
    // ------------------------------------------------------------------------

    pub fn instance_for(&self, identity: &VendorIdentity) -> Option<PeerHandle> {
        self.state.lock().registry.lookup_instance(identity).cloned()
    }

    pub fn channel_for(&self, identity: &VendorIdentity) -> Option<ChannelHandle> {
        self.state.lock().registry.lookup_channel(identity).cloned()
    }

    pub fn instances(&self) -> Vec<(VendorIdentity, PeerHandle)> {
        self.state.lock().registry.all_instances()
    }

    pub fn peer_state(&self, peer: &PeerHandle) -> Option<PeerState> {
        self.state.lock().peers.state(peer)
    }

    pub fn resolved_peers(&self) -> Vec<PeerHandle> {
        self.state.lock().peers.resolved()
    }

    pub fn has_seen(&self, sid: &str) -> bool {
        self.state.lock().dedup.seen(sid)
    }

    pub fn dedup_len(&self) -> usize {
        self.state.lock().dedup.len()
    }

    // ------------------------------------------------------------------------
    // OUTBOUND
    // ------------------------------------------------------------------------

    fn execute(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Mesh(peer, frame) => {
                    if let Err(e) = self.send_frame(&peer, &frame) {
                        debug!("Dropped {} frame to {}: {}", frame.message_type(), peer, e);
                    }
                }
                Action::Resolve(peer) => {
                    if let Err(e) = self.transport.resolve(&peer) {
                        debug!("Could not resolve {}: {}", peer, e);
                    }
                }
                Action::Provision(identity) => {
                    if let Err(e) = self.backend.provision_client(&identity) {
                        warn!("Could not provision chat client for {}: {}", identity, e);
                        let follow_up = connection_failed(&mut self.state.lock(), e.to_string());
                        self.execute(follow_up);
                    }
                }
                Action::Post(channel, text) => {
                    if let Err(e) = self.backend.send_text(&channel, &text) {
                        warn!("Backend send failed on {}: {}", channel, e);
                        self.notify(BridgeNotification::MessageSent(MessageStatus::Error));
                    }
                }
                Action::Notify(notification) => self.notify(notification),
            }
        }
    }

    fn send_frame(&self, peer: &PeerHandle, frame: &WireMessage) -> Result<(), BridgeError> {
        let bytes = encode_wire(frame)?;
        self.transport.send(peer, bytes)?;
        Ok(())
    }

    fn notify(&self, notification: BridgeNotification) {
        let delegate = self.delegate.read().clone();
        match delegate {
            Some(delegate) => notification.deliver(delegate.as_ref()),
            None => debug!("No delegate registered; dropped notification: {}", notification),
        }
    }
}

/// Dedup branch shared by chat messages from the backend and `receive`
/// frames from the mesh: a sid seen for the first time is shown locally,
/// a repeat is pushed out to every known instance except `from`.
fn relay_chat_message(
    state: &mut BridgeState,
    message: RelayMessage,
    from: Option<&PeerHandle>,
) -> Vec<Action> {
    if state.dedup.check_and_record(&message.sid) {
        return vec![Action::Notify(BridgeNotification::MessageReceived(message))];
    }

    state
        .registry
        .all_instances()
        .into_iter()
        .filter(|(_, peer)| Some(peer) != from)
        .map(|(_, peer)| Action::Mesh(peer, WireMessage::Receive(message.clone())))
        .collect()
}

fn connection_failed(state: &mut BridgeState, reason: String) -> Vec<Action> {
    warn!("Backend connection failed: {}", reason);
    state.has_backend_access = false;
    vec![Action::Notify(BridgeNotification::ConnectionFailed(reason))]
}
