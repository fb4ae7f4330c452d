//! Registry error types
//!
//! Error types for room registry operations.

use super::member::{MemberId, RoomId};

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No live room with this id
    RoomNotFound(RoomId),
    /// A live room with this id already exists
    RoomAlreadyExists(RoomId),
    /// Room id is empty or too long
    InvalidRoomId(String),
    /// Member is not connected (or not reachable from the sender)
    MemberNotFound(MemberId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::RoomNotFound(id) => write!(f, "Room does not exist: {}", id),
            RegistryError::RoomAlreadyExists(id) => write!(f, "Room already exists: {}", id),
            RegistryError::InvalidRoomId(id) => write!(f, "Invalid room id: {:?}", id),
            RegistryError::MemberNotFound(id) => write!(f, "Member not found: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
