//! Signaling wire messages
//!
//! Every message is a JSON object with a `type` tag and camelCase fields.
//! Client and server directions are separate closed enums so that each side
//! matches exhaustively on what it can actually receive.

use serde::{Deserialize, Serialize};

use crate::registry::{MemberId, RegistryError, RoomId, RoomMetadata};

/// Network reachability descriptor exchanged between peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate line (`candidate:...`)
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the m-line this candidate belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    /// ICE username fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Create a candidate with only the candidate line
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

/// Opaque negotiation payload relayed between two peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalPayload {
    /// Session description proposing connection parameters
    Offer { sdp: String },
    /// Session description accepting an offer
    Answer { sdp: String },
    /// Connectivity candidate
    Candidate { candidate: IceCandidate },
}

impl SignalPayload {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::Candidate { .. } => "candidate",
        }
    }
}

/// Addressed signaling payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Recipient
    pub to: MemberId,
    /// Sender (stamped by the server)
    pub from: MemberId,
    /// Payload, forwarded unchanged
    pub payload: SignalPayload,
}

/// Machine readable reason attached to `request-failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCode {
    /// Room (or target member) does not exist
    NotFound,
    /// Room id is already taken
    AlreadyExists,
    /// Room id failed validation
    InvalidRoom,
}

impl From<&RegistryError> for FailureCode {
    fn from(err: &RegistryError) -> Self {
        match err {
            RegistryError::RoomNotFound(_) | RegistryError::MemberNotFound(_) => {
                FailureCode::NotFound
            }
            RegistryError::RoomAlreadyExists(_) => FailureCode::AlreadyExists,
            RegistryError::InvalidRoomId(_) => FailureCode::InvalidRoom,
        }
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureCode::NotFound => "not-found",
            FailureCode::AlreadyExists => "already-exists",
            FailureCode::InvalidRoom => "invalid-room",
        };
        f.write_str(name)
    }
}

/// Messages sent by clients to the signaling service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Create a new room and become its first member
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        room_id: RoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },

    /// Join an existing room
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        room_id: RoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },

    /// Leave a room
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: RoomId },

    /// Change display name and/or color
    #[serde(rename_all = "camelCase")]
    UpdateProfile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },

    /// Relay a payload to another member. `from` is ignored by the server.
    #[serde(rename_all = "camelCase")]
    Signal {
        to: MemberId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<MemberId>,
        payload: SignalPayload,
    },
}

impl ClientMessage {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom { .. } => "create-room",
            ClientMessage::JoinRoom { .. } => "join-room",
            ClientMessage::LeaveRoom { .. } => "leave-room",
            ClientMessage::UpdateProfile { .. } => "update-profile",
            ClientMessage::Signal { .. } => "signal",
        }
    }
}

/// Messages sent by the signaling service to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First message on every connection: the member id assigned to it
    #[serde(rename_all = "camelCase")]
    Welcome { member_id: MemberId },

    /// Acknowledges `create-room`
    #[serde(rename_all = "camelCase")]
    RoomCreated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        room_id: RoomId,
        metadata: RoomMetadata,
    },

    /// Acknowledges `join-room`
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        room_id: RoomId,
        others: Vec<MemberId>,
        metadata: RoomMetadata,
    },

    /// Rejects `create-room` or `join-room`
    #[serde(rename_all = "camelCase")]
    RequestFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        code: FailureCode,
        message: String,
    },

    /// A new member joined the caller's room
    #[serde(rename_all = "camelCase")]
    PeerJoined {
        member_id: MemberId,
        display_name: String,
    },

    /// A member left the caller's room
    #[serde(rename_all = "camelCase")]
    PeerLeft { member_id: MemberId },

    /// Full metadata map after any membership or profile change
    #[serde(rename_all = "camelCase")]
    RoomMeta {
        room_id: RoomId,
        metadata: RoomMetadata,
    },

    /// Relayed payload from another member
    Signal(SignalEnvelope),
}

impl ServerMessage {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::RoomCreated { .. } => "room-created",
            ServerMessage::RoomJoined { .. } => "room-joined",
            ServerMessage::RequestFailed { .. } => "request-failed",
            ServerMessage::PeerJoined { .. } => "peer-joined",
            ServerMessage::PeerLeft { .. } => "peer-left",
            ServerMessage::RoomMeta { .. } => "room-meta",
            ServerMessage::Signal(_) => "signal",
        }
    }

    /// Request id this message answers, if it is an acknowledgement
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerMessage::RoomCreated { request_id, .. }
            | ServerMessage::RoomJoined { request_id, .. }
            | ServerMessage::RequestFailed { request_id, .. } => *request_id,
            _ => None,
        }
    }
}
