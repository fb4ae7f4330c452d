//! Room entry and per-member connection records
//!
//! This module defines the per-room state stored in the registry.

use std::collections::BTreeMap;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

use super::member::{MemberId, MemberInfo, RoomId};

/// Metadata map published to room members
pub type RoomMetadata = BTreeMap<MemberId, MemberInfo>;

/// A live room
#[derive(Debug)]
pub struct Room {
    /// Room id
    pub id: RoomId,

    /// Members in join order
    members: Vec<MemberId>,

    /// Display metadata per member
    metadata: RoomMetadata,

    /// When the room was created
    pub created_at: Instant,
}

impl Room {
    /// Create a room with a single founding member
    pub(super) fn new(id: RoomId, founder: MemberId, info: MemberInfo) -> Self {
        let mut metadata = RoomMetadata::new();
        metadata.insert(founder.clone(), info);

        Self {
            id,
            members: vec![founder],
            metadata,
            created_at: Instant::now(),
        }
    }

    /// Members in join order
    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    /// Display metadata
    pub fn metadata(&self) -> &RoomMetadata {
        &self.metadata
    }

    /// Check membership
    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.contains(member)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the room has no members left
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Add a member (or refresh its metadata if already present)
    ///
    /// Returns true if the member was newly added.
    pub(super) fn insert(&mut self, member: MemberId, info: MemberInfo) -> bool {
        self.metadata.insert(member.clone(), info);
        if self.contains(&member) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Remove a member
    ///
    /// Returns true if the member was present.
    pub(super) fn remove(&mut self, member: &MemberId) -> bool {
        self.metadata.remove(member);
        let before = self.members.len();
        self.members.retain(|m| m != member);
        self.members.len() != before
    }

    /// Mutable access to one member's metadata
    pub(super) fn info_mut(&mut self, member: &MemberId) -> Option<&mut MemberInfo> {
        self.metadata.get_mut(member)
    }

    /// Snapshot of the room for acknowledgements
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Room state returned to a successful `create_room`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    /// Room id
    pub room_id: RoomId,
    /// Current metadata map
    pub metadata: RoomMetadata,
}

/// Result of a successful `join_room`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Room id
    pub room_id: RoomId,
    /// Members present before the join, in join order (never includes the caller)
    pub others: Vec<MemberId>,
    /// Metadata map including the caller
    pub metadata: RoomMetadata,
}

/// Connection record for a member
#[derive(Debug)]
pub(super) struct MemberEntry {
    /// Outbound message queue drained by the member's connection task
    pub outbox: mpsc::Sender<ServerMessage>,

    /// Room the member currently belongs to
    pub room: Option<RoomId>,

    /// Profile used when joining rooms without an explicit display name
    pub profile: MemberInfo,
}
