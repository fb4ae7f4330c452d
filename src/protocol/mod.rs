//! Signaling wire protocol
//!
//! JSON text messages exchanged between clients and the signaling service:
//!
//! ```text
//! Joiner (B)                  Service                  Member (A)
//!    |-- join-room ------------->|                          |
//!    |<-- room-joined{others:[A]}|-- peer-joined{B} ------->|
//!    |-- signal{to:A, offer} --->|-- signal{from:B} ------->|
//!    |<-- signal{from:A} --------|<-- signal{to:B, answer} -|
//!    |<========= candidates, both directions, relayed =====>|
//! ```
//!
//! Payloads are relayed unchanged; the service only stamps the sender id.

pub mod codec;
pub mod message;

pub use message::{
    ClientMessage, FailureCode, IceCandidate, ServerMessage, SignalEnvelope, SignalPayload,
};
