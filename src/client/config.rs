//! Signaling client configuration

use std::time::Duration;

/// Default time to wait for a create/join acknowledgement
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Signaling client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the signaling service (`ws://host:port`)
    pub url: String,

    /// Time to wait for an acknowledgement before giving up
    pub request_timeout: Duration,

    /// Capacity of the outbound and event channels
    pub channel_capacity: usize,
}

impl ClientConfig {
    /// Create a config for the given service URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            channel_capacity: 256,
        }
    }

    /// Set the acknowledgement timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the channel capacity
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}
