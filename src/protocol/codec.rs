//! JSON text codec for signaling messages

use serde::Serialize;

use crate::error::SignalError;

use super::message::{ClientMessage, ServerMessage};

/// Decode a client message, enforcing a size limit
pub fn decode_client(text: &str, max_size: usize) -> Result<ClientMessage, SignalError> {
    if text.len() > max_size {
        return Err(SignalError::TooLarge {
            size: text.len(),
            max: max_size,
        });
    }

    serde_json::from_str(text).map_err(|e| SignalError::Malformed(e.to_string()))
}

/// Decode a server message
pub fn decode_server(text: &str) -> Result<ServerMessage, SignalError> {
    serde_json::from_str(text).map_err(|e| SignalError::Malformed(e.to_string()))
}

/// Decode a client message carried in a binary frame
pub fn decode_client_bytes(data: &[u8], max_size: usize) -> Result<ClientMessage, SignalError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| SignalError::Malformed(format!("invalid UTF-8: {}", e)))?;
    decode_client(text, max_size)
}

/// Encode any wire message as a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String, SignalError> {
    serde_json::to_string(msg).map_err(|e| SignalError::Malformed(e.to_string()))
}
