//! Connection engine abstraction
//!
//! The negotiation state machine never talks to a concrete WebRTC stack.
//! It drives a [`PeerConnection`], which an application backs with whatever
//! engine it embeds. Local candidates and transport state changes flow the
//! other way, reported by the application through the `PeerManager`.

use std::fmt;
use std::future::Future;

use bytes::Bytes;

use crate::protocol::{IceCandidate, SignalPayload};
use crate::registry::MemberId;

use super::error::NegotiationError;

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description produced or consumed by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Convert into a relayable payload
    pub fn into_payload(self) -> SignalPayload {
        match self.kind {
            SdpKind::Offer => SignalPayload::Offer { sdp: self.sdp },
            SdpKind::Answer => SignalPayload::Answer { sdp: self.sdp },
        }
    }
}

/// Transport state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl TransportState {
    /// Whether this state ends the link
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransportState::Disconnected | TransportState::Failed | TransportState::Closed
        )
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::New => write!(f, "New"),
            TransportState::Connecting => write!(f, "Connecting"),
            TransportState::Connected => write!(f, "Connected"),
            TransportState::Disconnected => write!(f, "Disconnected"),
            TransportState::Failed => write!(f, "Failed"),
            TransportState::Closed => write!(f, "Closed"),
        }
    }
}

/// One peer-to-peer connection as seen by the negotiation layer
pub trait PeerConnection: Send {
    /// Create an offer (does not apply it)
    fn create_offer(
        &mut self,
    ) -> impl Future<Output = Result<SessionDescription, NegotiationError>> + Send;

    /// Create an answer to the applied remote offer (does not apply it)
    fn create_answer(
        &mut self,
    ) -> impl Future<Output = Result<SessionDescription, NegotiationError>> + Send;

    fn set_local_description(
        &mut self,
        desc: SessionDescription,
    ) -> impl Future<Output = Result<(), NegotiationError>> + Send;

    fn set_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> impl Future<Output = Result<(), NegotiationError>> + Send;

    fn add_ice_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> impl Future<Output = Result<(), NegotiationError>> + Send;

    /// Send an opaque blob over the connection's data channel
    fn send_data(&mut self, data: Bytes)
        -> impl Future<Output = Result<(), NegotiationError>> + Send;

    /// Release the connection
    fn close(&mut self) -> impl Future<Output = Result<(), NegotiationError>> + Send;
}

/// Creates a connection for a newly discovered remote peer
pub trait ConnectionFactory: Send {
    type Connection: PeerConnection;

    fn connect(&mut self, remote: &MemberId) -> Result<Self::Connection, NegotiationError>;
}

impl<F, C> ConnectionFactory for F
where
    F: FnMut(&MemberId) -> Result<C, NegotiationError> + Send,
    C: PeerConnection,
{
    type Connection = C;

    fn connect(&mut self, remote: &MemberId) -> Result<C, NegotiationError> {
        self(remote)
    }
}
