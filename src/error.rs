//! Error types
//!
//! Crate-wide error and the per-concern error enums that feed into it.

use std::fmt;

use tokio_tungstenite::tungstenite;

use crate::negotiation::NegotiationError;
use crate::protocol::FailureCode;
use crate::registry::RegistryError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket or pipe I/O failure
    Io(std::io::Error),
    /// WebSocket protocol failure
    WebSocket(tungstenite::Error),
    /// Room registry rejected an operation
    Registry(RegistryError),
    /// Signaling message could not be decoded or was rejected
    Signal(SignalError),
    /// Peer negotiation failure
    Negotiation(NegotiationError),
    /// Encoding subprocess failed
    Subprocess(SubprocessError),
    /// Server answered a request with a failure
    Request { code: FailureCode, message: String },
    /// Request did not receive an answer in time
    Timeout,
    /// Internal channel closed (peer task gone)
    ChannelClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Signal(e) => write!(f, "Signaling error: {}", e),
            Error::Negotiation(e) => write!(f, "Negotiation error: {}", e),
            Error::Subprocess(e) => write!(f, "Subprocess error: {}", e),
            Error::Request { code, message } => {
                write!(f, "Request failed ({}): {}", code, message)
            }
            Error::Timeout => write!(f, "Request timed out"),
            Error::ChannelClosed => write!(f, "Channel closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::WebSocket(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Signal(e) => Some(e),
            Error::Negotiation(e) => Some(e),
            Error::Subprocess(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Error::WebSocket(err)
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        Error::Registry(err)
    }
}

impl From<SignalError> for Error {
    fn from(err: SignalError) -> Self {
        Error::Signal(err)
    }
}

impl From<NegotiationError> for Error {
    fn from(err: NegotiationError) -> Self {
        Error::Negotiation(err)
    }
}

impl From<SubprocessError> for Error {
    fn from(err: SubprocessError) -> Self {
        Error::Subprocess(err)
    }
}

/// Wire-level signaling errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// Message is not valid JSON or does not match any known message type
    Malformed(String),
    /// Message exceeds the configured size limit
    TooLarge { size: usize, max: usize },
    /// Message kind is valid but not expected in this direction
    UnexpectedMessage(String),
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalError::Malformed(reason) => write!(f, "Malformed message: {}", reason),
            SignalError::TooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max {})", size, max)
            }
            SignalError::UnexpectedMessage(kind) => write!(f, "Unexpected message: {}", kind),
        }
    }
}

impl std::error::Error for SignalError {}

/// Encoding subprocess failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubprocessError {
    /// Process exited with a code outside the accepted set
    NonZeroExit(i32),
    /// Process was terminated by a signal it did not ask for
    Terminated,
    /// A required stdio pipe was not captured
    MissingPipe(&'static str),
}

impl fmt::Display for SubprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubprocessError::NonZeroExit(code) => write!(f, "Process exited with code {}", code),
            SubprocessError::Terminated => write!(f, "Process terminated by signal"),
            SubprocessError::MissingPipe(name) => write!(f, "Process {} is not piped", name),
        }
    }
}

impl std::error::Error for SubprocessError {}
