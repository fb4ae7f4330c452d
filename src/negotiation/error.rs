//! Negotiation error types

use std::fmt;

/// Error type for peer negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Payload is not valid in the link's current state
    OutOfSequence(String),
    /// Link is closed and can no longer be used
    Closed,
    /// Link exists but its transport is not connected yet
    NotConnected,
    /// Underlying connection engine rejected an operation
    Engine(String),
    /// Outbound signal channel is gone
    SignalChannelClosed,
}

impl NegotiationError {
    /// Whether the error leaves the link usable
    ///
    /// Out-of-sequence payloads are ignored; everything else ends the link.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NegotiationError::OutOfSequence(_) | NegotiationError::NotConnected
        )
    }
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationError::OutOfSequence(what) => write!(f, "Out of sequence: {}", what),
            NegotiationError::Closed => write!(f, "Link is closed"),
            NegotiationError::NotConnected => write!(f, "Link is not connected"),
            NegotiationError::Engine(reason) => write!(f, "Connection engine error: {}", reason),
            NegotiationError::SignalChannelClosed => write!(f, "Signal channel closed"),
        }
    }
}

impl std::error::Error for NegotiationError {}
