//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default signaling port
pub const DEFAULT_PORT: u16 = 3000;

/// Default maximum size of one client message in bytes
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default per-connection outbound queue capacity
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

const MIN_PING_INTERVAL: Duration = Duration::from_millis(10);

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Messages queued per connection before new ones are dropped
    pub outbox_capacity: usize,

    /// Largest client message accepted, in bytes
    pub max_message_size: usize,

    /// WebSocket handshake must complete within this time
    pub handshake_timeout: Duration,

    /// Idle timeout (disconnect if nothing is received, pongs included)
    pub idle_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            handshake_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(120),
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-connection outbound queue capacity
    pub fn outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity.max(1);
        self
    }

    /// Set the maximum client message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Interval between server pings, half the idle timeout
    pub fn ping_interval(&self) -> Duration {
        (self.idle_timeout / 2).max(MIN_PING_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.outbox_capacity, DEFAULT_OUTBOX_CAPACITY);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 4000);
    }

    #[test]
    fn test_ping_interval() {
        let config = ServerConfig::default().idle_timeout(Duration::from_secs(120));
        assert_eq!(config.ping_interval(), Duration::from_secs(60));

        let config = ServerConfig::default().idle_timeout(Duration::ZERO);
        assert_eq!(config.ping_interval(), MIN_PING_INTERVAL);
    }

    #[test]
    fn test_outbox_capacity_floor() {
        let config = ServerConfig::default().outbox_capacity(0);

        assert_eq!(config.outbox_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:3001".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .max_message_size(1024)
            .handshake_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(30));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.max_message_size, 1024);
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
    }
}
