//! Client-side owner of all peer links
//!
//! The manager turns signaling events into link operations: a join makes the
//! local member Initiator toward every existing member, a `peer-joined`
//! prepares a Responder, and relayed payloads are routed to the link of their
//! sender. It also forwards document-sync updates between the local editor
//! and every connected link.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::protocol::{IceCandidate, ServerMessage, SignalEnvelope, SignalPayload};
use crate::registry::{MemberId, MemberInfo, RoomId, RoomMetadata};

use super::connection::{ConnectionFactory, TransportState};
use super::error::NegotiationError;
use super::link::{LinkState, PeerLink, Role};

/// Document update received from a remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocUpdate {
    pub from: MemberId,
    pub data: Bytes,
}

/// Owns one `PeerLink` per remote member
pub struct PeerManager<F: ConnectionFactory> {
    factory: F,
    local: Option<MemberId>,
    room: Option<RoomId>,
    links: HashMap<MemberId, PeerLink<F::Connection>>,
    metadata: RoomMetadata,

    /// Outbound payloads, drained into the signaling connection
    signals: mpsc::UnboundedSender<SignalEnvelope>,

    /// Inbound document updates, drained by the editor integration
    updates: Option<mpsc::UnboundedSender<DocUpdate>>,
}

impl<F: ConnectionFactory> PeerManager<F> {
    /// Create a manager that sends its payloads into `signals`
    pub fn new(factory: F, signals: mpsc::UnboundedSender<SignalEnvelope>) -> Self {
        Self {
            factory,
            local: None,
            room: None,
            links: HashMap::new(),
            metadata: RoomMetadata::new(),
            signals,
            updates: None,
        }
    }

    /// Deliver inbound document updates to this channel
    pub fn with_updates(mut self, updates: mpsc::UnboundedSender<DocUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Set the member id assigned by the server
    pub fn set_local_id(&mut self, id: MemberId) {
        self.local = Some(id);
    }

    pub fn local_id(&self) -> Option<&MemberId> {
        self.local.as_ref()
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn link(&self, remote: &MemberId) -> Option<&PeerLink<F::Connection>> {
        self.links.get(remote)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Remote members with a link in the given state
    pub fn peers_in(&self, state: LinkState) -> Vec<MemberId> {
        let mut peers: Vec<MemberId> = self
            .links
            .values()
            .filter(|link| link.state() == state)
            .map(|link| link.remote().clone())
            .collect();
        peers.sort();
        peers
    }

    /// Last known metadata of the current room
    pub fn metadata(&self) -> &RoomMetadata {
        &self.metadata
    }

    /// Display name of a member, if known
    pub fn display_name(&self, member: &MemberId) -> Option<&str> {
        self.metadata
            .get(member)
            .map(|info| info.display_name.as_str())
    }

    /// Apply one message from the signaling service
    pub async fn handle_server_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Welcome { member_id } => {
                tracing::debug!(member = %member_id, "Assigned member id");
                self.set_local_id(member_id);
            }
            ServerMessage::RoomCreated {
                room_id, metadata, ..
            } => {
                self.enter_room(room_id).await;
                self.metadata = metadata;
            }
            ServerMessage::RoomJoined {
                room_id,
                others,
                metadata,
                ..
            } => {
                self.on_joined(room_id, others, metadata).await;
            }
            ServerMessage::RequestFailed { code, message, .. } => {
                tracing::debug!(code = %code, message = %message, "Request failed");
            }
            ServerMessage::PeerJoined {
                member_id,
                display_name,
            } => {
                self.on_peer_joined(member_id, display_name).await;
            }
            ServerMessage::PeerLeft { member_id } => {
                self.on_peer_left(&member_id).await;
            }
            ServerMessage::RoomMeta { room_id, metadata } => {
                if self.room.as_ref() == Some(&room_id) {
                    self.metadata = metadata;
                }
            }
            ServerMessage::Signal(envelope) => {
                self.on_signal(envelope.from, envelope.payload).await;
            }
        }
    }

    /// The local member joined a room; initiate toward everyone already in it
    pub async fn on_joined(
        &mut self,
        room_id: RoomId,
        others: Vec<MemberId>,
        metadata: RoomMetadata,
    ) {
        self.enter_room(room_id).await;
        self.metadata = metadata;

        for remote in others {
            if Some(&remote) == self.local.as_ref() || self.links.contains_key(&remote) {
                continue;
            }

            let Some(link) = self.create_link(&remote, Role::Initiator) else {
                continue;
            };
            let link = self.links.entry(remote.clone()).or_insert(link);
            let result = link.start().await;
            self.settle(&remote, result).await;
        }
    }

    /// A member joined the local member's room; it will initiate toward us
    pub async fn on_peer_joined(&mut self, member: MemberId, display_name: String) {
        if Some(&member) == self.local.as_ref() {
            return;
        }

        self.metadata
            .entry(member.clone())
            .or_insert_with(|| MemberInfo::new(display_name));

        if !self.links.contains_key(&member) {
            if let Some(link) = self.create_link(&member, Role::Responder) {
                self.links.insert(member, link);
            }
        }
    }

    /// Route a relayed payload to the sender's link, creating a Responder if needed
    pub async fn on_signal(&mut self, from: MemberId, payload: SignalPayload) {
        if Some(&from) == self.local.as_ref() {
            return;
        }

        if !self.links.contains_key(&from) {
            let Some(link) = self.create_link(&from, Role::Responder) else {
                return;
            };
            self.links.insert(from.clone(), link);
        }

        let kind = payload.kind();
        let result = match self.links.get_mut(&from) {
            Some(link) => link.handle_signal(payload).await,
            None => return,
        };

        if let Err(e) = &result {
            tracing::debug!(remote = %from, kind, error = %e, "Signal not applied");
        }
        self.settle(&from, result).await;
    }

    /// A member left: destroy its link
    pub async fn on_peer_left(&mut self, member: &MemberId) {
        self.metadata.remove(member);

        if let Some(mut link) = self.links.remove(member) {
            link.close().await;
            tracing::debug!(remote = %member, "Link removed");
        }
    }

    /// Relay a candidate gathered by the local engine
    pub fn on_local_candidate(
        &mut self,
        remote: &MemberId,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        self.links
            .get_mut(remote)
            .ok_or(NegotiationError::Closed)?
            .send_local_candidate(candidate)
    }

    /// React to a transport state change of one link
    pub async fn on_transport_state(&mut self, remote: &MemberId, transport: TransportState) {
        let Some(link) = self.links.get_mut(remote) else {
            return;
        };

        if link.on_transport_state(transport).await == LinkState::Closed {
            self.links.remove(remote);
        }
    }

    /// Send a local document update to every connected peer
    ///
    /// Returns the number of peers the update was handed to.
    pub async fn forward_update(&mut self, data: Bytes) -> usize {
        let mut sent = 0;

        for link in self.links.values_mut() {
            if link.state() != LinkState::Connected {
                continue;
            }
            match link.send_data(data.clone()).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(remote = %link.remote(), error = %e, "Update not sent");
                }
            }
        }

        sent
    }

    /// Deliver an update received on a peer's data channel to the editor
    pub fn on_data(&self, from: &MemberId, data: Bytes) {
        let Some(updates) = &self.updates else {
            return;
        };

        if updates
            .send(DocUpdate {
                from: from.clone(),
                data,
            })
            .is_err()
        {
            tracing::debug!(remote = %from, "Editor channel closed, update dropped");
        }
    }

    /// Leave the current room locally: close every link
    pub async fn leave(&mut self) {
        for (_, mut link) in self.links.drain() {
            link.close().await;
        }
        self.metadata.clear();
        self.room = None;
    }

    async fn enter_room(&mut self, room_id: RoomId) {
        if self.room.as_ref() != Some(&room_id) {
            self.leave().await;
            self.room = Some(room_id);
        }
    }

    fn create_link(&mut self, remote: &MemberId, role: Role) -> Option<PeerLink<F::Connection>> {
        let Some(local) = self.local.clone() else {
            tracing::warn!(remote = %remote, "No member id assigned yet, link not created");
            return None;
        };

        match self.factory.connect(remote) {
            Ok(connection) => {
                tracing::debug!(remote = %remote, role = ?role, "Link created");
                Some(PeerLink::new(
                    local,
                    remote.clone(),
                    role,
                    connection,
                    self.signals.clone(),
                ))
            }
            Err(e) => {
                tracing::warn!(remote = %remote, error = %e, "Connection creation failed");
                None
            }
        }
    }

    /// Drop a link after a terminal error; recoverable errors leave it alone
    async fn settle(&mut self, remote: &MemberId, result: Result<(), NegotiationError>) {
        let Err(e) = result else {
            return;
        };
        if e.is_recoverable() {
            return;
        }

        if let Some(mut link) = self.links.remove(remote) {
            tracing::warn!(remote = %remote, error = %e, "Link failed");
            link.close().await;
        }
    }
}
