//! Peer negotiation
//!
//! Client-side state machines that turn relayed signaling payloads into
//! direct peer connections. The concrete connection engine stays outside
//! the crate behind [`PeerConnection`].

pub mod connection;
pub mod error;
pub mod link;
pub mod manager;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::{
    ConnectionFactory, PeerConnection, SdpKind, SessionDescription, TransportState,
};
pub use error::NegotiationError;
pub use link::{LinkState, PeerLink, Role};
pub use manager::{DocUpdate, PeerManager};
