//! Room registry implementation
//!
//! The central registry that owns all live rooms and the connection records
//! of every member, and relays signaling payloads between members.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};

use crate::protocol::{ServerMessage, SignalEnvelope};

use super::config::RegistryConfig;
use super::entry::{JoinOutcome, MemberEntry, Room, RoomSnapshot};
use super::error::RegistryError;
use super::member::{MemberId, MemberInfo, RoomId};

/// Mutable registry state, guarded by a single lock
#[derive(Debug, Default)]
struct RegistryState {
    rooms: HashMap<RoomId, Room>,
    members: HashMap<MemberId, MemberEntry>,
}

/// Central registry for rooms and connected members
///
/// Every mutation (create, join, leave, disconnect, profile update) runs
/// under the write lock, and the resulting notifications are queued before
/// the lock is released. Observers therefore never see an event for a
/// membership change that is not committed, and per-recipient event order
/// matches commit order.
pub struct RoomRegistry {
    state: RwLock<RegistryState>,

    /// Configuration
    config: RegistryConfig,
}

impl RoomRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a connected member and the queue its events are delivered to
    ///
    /// Re-registering an id first removes the previous registration exactly
    /// like a disconnect would.
    pub async fn connect(&self, member: MemberId, outbox: mpsc::Sender<ServerMessage>) {
        let mut state = self.state.write().await;

        if state.members.contains_key(&member) {
            tracing::warn!(member = %member, "Member id re-registered, dropping old record");
            state.remove_member(&member);
        }

        state.members.insert(
            member.clone(),
            MemberEntry {
                outbox,
                room: None,
                profile: MemberInfo::new(self.config.default_display_name.clone()),
            },
        );

        tracing::debug!(member = %member, members = state.members.len(), "Member connected");
    }

    /// Handle an abrupt connection loss
    ///
    /// Leaves every room the member belongs to (with the same notifications
    /// as `leave_room`) and drops its connection record.
    pub async fn disconnect(&self, member: &MemberId) {
        let mut state = self.state.write().await;
        let left = state.remove_member(member);

        tracing::debug!(
            member = %member,
            rooms_left = left,
            members = state.members.len(),
            "Member disconnected"
        );
    }

    /// Create a room with the caller as its only member
    pub async fn create_room(
        &self,
        room_id: &RoomId,
        caller: &MemberId,
        display_name: Option<&str>,
        color: Option<&str>,
    ) -> Result<RoomSnapshot, RegistryError> {
        let room_id = self.validate_room_id(room_id)?;
        let mut state = self.state.write().await;

        if !state.members.contains_key(caller) {
            return Err(RegistryError::MemberNotFound(caller.clone()));
        }
        if state.rooms.contains_key(&room_id) {
            return Err(RegistryError::RoomAlreadyExists(room_id));
        }

        state.leave_current_room(caller);

        let info = state.resolve_profile(caller, display_name, color);
        let room = Room::new(room_id.clone(), caller.clone(), info);
        let snapshot = room.snapshot();
        state.rooms.insert(room_id.clone(), room);

        if let Some(entry) = state.members.get_mut(caller) {
            entry.room = Some(room_id.clone());
        }

        tracing::info!(
            room = %room_id,
            member = %caller,
            rooms = state.rooms.len(),
            "Room created"
        );

        Ok(snapshot)
    }

    /// Join an existing room
    ///
    /// Returns the members that were present before the join; the caller is
    /// expected to initiate negotiation toward each of them. Every one of
    /// them receives `peer-joined`.
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        caller: &MemberId,
        display_name: Option<&str>,
        color: Option<&str>,
    ) -> Result<JoinOutcome, RegistryError> {
        let room_id = self.validate_room_id(room_id)?;
        let mut state = self.state.write().await;

        if !state.members.contains_key(caller) {
            return Err(RegistryError::MemberNotFound(caller.clone()));
        }
        if !state.rooms.contains_key(&room_id) {
            return Err(RegistryError::RoomNotFound(room_id));
        }

        if state.room_of(caller) != Some(&room_id) {
            state.leave_current_room(caller);
        }

        let info = state.resolve_profile(caller, display_name, color);
        let display_name = info.display_name.clone();

        let RegistryState { rooms, members } = &mut *state;
        let Some(room) = rooms.get_mut(&room_id) else {
            // Only reachable if leaving the previous room deleted this one,
            // which cannot happen since they differ.
            return Err(RegistryError::RoomNotFound(room_id));
        };

        let others: Vec<MemberId> = room
            .members()
            .iter()
            .filter(|m| *m != caller)
            .cloned()
            .collect();
        let newly_joined = room.insert(caller.clone(), info);

        if let Some(entry) = members.get_mut(caller) {
            entry.room = Some(room_id.clone());
        }

        if newly_joined {
            let event = ServerMessage::PeerJoined {
                member_id: caller.clone(),
                display_name,
            };
            for other in &others {
                notify(members, other, event.clone());
            }
        }
        broadcast_meta(members, room, Some(caller));

        tracing::info!(
            room = %room_id,
            member = %caller,
            others = others.len(),
            rejoin = !newly_joined,
            "Member joined room"
        );

        Ok(JoinOutcome {
            room_id,
            others,
            metadata: room.metadata().clone(),
        })
    }

    /// Leave a room
    ///
    /// Idempotent: leaving a room the caller is not in, or a room that no
    /// longer exists, changes nothing. Returns true if the caller was removed.
    pub async fn leave_room(&self, room_id: &RoomId, caller: &MemberId) -> bool {
        let mut state = self.state.write().await;
        state.leave(room_id, caller)
    }

    /// Update the caller's display name and/or color
    ///
    /// The new profile is used for future joins and, if the caller is in a
    /// room, published to that room with `room-meta`.
    pub async fn update_profile(
        &self,
        caller: &MemberId,
        display_name: Option<&str>,
        color: Option<&str>,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        let info = state.resolve_profile(caller, display_name, color);

        let RegistryState { rooms, members } = &mut *state;
        let entry = members
            .get_mut(caller)
            .ok_or_else(|| RegistryError::MemberNotFound(caller.clone()))?;
        entry.profile = info.clone();

        let Some(room_id) = entry.room.clone() else {
            return Ok(());
        };

        if let Some(room) = rooms.get_mut(&room_id) {
            if let Some(slot) = room.info_mut(caller) {
                *slot = info;
            }
            broadcast_meta(members, room, None);
        }

        tracing::debug!(room = %room_id, member = %caller, "Profile updated");
        Ok(())
    }

    /// Relay a payload to its recipient
    ///
    /// The recipient must be connected and share a room with the sender;
    /// otherwise the payload is dropped and `MemberNotFound` is returned.
    /// Delivery is best-effort: a full recipient queue drops the payload.
    pub async fn relay(&self, envelope: SignalEnvelope) -> Result<(), RegistryError> {
        let state = self.state.read().await;

        let sender_room = state.room_of(&envelope.from);
        let recipient_room = state.room_of(&envelope.to);

        if sender_room.is_none() || sender_room != recipient_room {
            return Err(RegistryError::MemberNotFound(envelope.to));
        }

        tracing::debug!(
            from = %envelope.from,
            to = %envelope.to,
            kind = envelope.payload.kind(),
            "Relaying signal"
        );

        let to = envelope.to.clone();
        notify(&state.members, &to, ServerMessage::Signal(envelope));
        Ok(())
    }

    /// Check if a room currently exists
    pub async fn room_exists(&self, room_id: &RoomId) -> bool {
        self.state.read().await.rooms.contains_key(room_id)
    }

    /// Members of a room in join order
    pub async fn room_members(&self, room_id: &RoomId) -> Option<Vec<MemberId>> {
        let state = self.state.read().await;
        state.rooms.get(room_id).map(|room| room.members().to_vec())
    }

    /// Snapshot of a room's metadata
    pub async fn room_snapshot(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        let state = self.state.read().await;
        state.rooms.get(room_id).map(Room::snapshot)
    }

    /// Room the member currently belongs to
    pub async fn room_of(&self, member: &MemberId) -> Option<RoomId> {
        self.state.read().await.room_of(member).cloned()
    }

    /// Get total number of live rooms
    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    /// Get total number of connected members
    pub async fn member_count(&self) -> usize {
        self.state.read().await.members.len()
    }

    fn validate_room_id(&self, room_id: &RoomId) -> Result<RoomId, RegistryError> {
        let trimmed = room_id.as_str().trim();
        if trimmed.is_empty() || trimmed.len() > self.config.max_room_id_len {
            return Err(RegistryError::InvalidRoomId(room_id.as_str().to_string()));
        }
        Ok(RoomId::new(trimmed))
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryState {
    fn room_of(&self, member: &MemberId) -> Option<&RoomId> {
        self.members.get(member).and_then(|entry| entry.room.as_ref())
    }

    /// Build the metadata a member publishes, falling back to its stored profile
    fn resolve_profile(
        &self,
        member: &MemberId,
        display_name: Option<&str>,
        color: Option<&str>,
    ) -> MemberInfo {
        let mut info = self
            .members
            .get(member)
            .map(|entry| entry.profile.clone())
            .unwrap_or_else(|| MemberInfo::new(String::new()));

        if let Some(name) = display_name.map(str::trim).filter(|name| !name.is_empty()) {
            info.display_name = name.to_string();
        }
        if let Some(color) = color.map(str::trim).filter(|color| !color.is_empty()) {
            info.color = Some(color.to_string());
        }
        info
    }

    fn leave_current_room(&mut self, member: &MemberId) {
        if let Some(current) = self.room_of(member).cloned() {
            self.leave(&current, member);
        }
    }

    fn leave(&mut self, room_id: &RoomId, member: &MemberId) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            tracing::debug!(room = %room_id, member = %member, "Leave for unknown room ignored");
            return false;
        };

        let removed = room.remove(member);

        if let Some(entry) = self.members.get_mut(member) {
            if entry.room.as_ref() == Some(room_id) {
                entry.room = None;
            }
        }

        if room.is_empty() {
            self.rooms.remove(room_id);
            tracing::info!(room = %room_id, member = %member, "Room deleted (empty)");
            return removed;
        }

        let event = ServerMessage::PeerLeft {
            member_id: member.clone(),
        };
        for other in room.members() {
            notify(&self.members, other, event.clone());
        }
        broadcast_meta(&self.members, room, None);

        if removed {
            tracing::info!(
                room = %room_id,
                member = %member,
                remaining = room.len(),
                "Member left room"
            );
        }
        removed
    }

    /// Leave every room containing the member and drop its record
    fn remove_member(&mut self, member: &MemberId) -> usize {
        let rooms: Vec<RoomId> = self
            .rooms
            .values()
            .filter(|room| room.contains(member))
            .map(|room| room.id.clone())
            .collect();

        let mut left = 0;
        for room_id in &rooms {
            if self.leave(room_id, member) {
                left += 1;
            }
        }

        self.members.remove(member);
        left
    }
}

/// Queue a message for one member
///
/// Returns false if the member is gone or its queue is full.
fn notify(
    members: &HashMap<MemberId, MemberEntry>,
    member: &MemberId,
    msg: ServerMessage,
) -> bool {
    let Some(entry) = members.get(member) else {
        return false;
    };

    match entry.outbox.try_send(msg) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            tracing::warn!(member = %member, kind = msg.kind(), "Outbox full, message dropped");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(member = %member, "Outbox closed, message dropped");
            false
        }
    }
}

/// Send the room's full metadata map to its members
fn broadcast_meta(
    members: &HashMap<MemberId, MemberEntry>,
    room: &Room,
    except: Option<&MemberId>,
) {
    let event = ServerMessage::RoomMeta {
        room_id: room.id.clone(),
        metadata: room.metadata().clone(),
    };

    for member in room.members() {
        if Some(member) != except {
            notify(members, member, event.clone());
        }
    }
}
