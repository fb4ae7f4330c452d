//! Signaling server
//!
//! WebSocket front end for the [`RoomRegistry`](crate::registry::RoomRegistry),
//! plus the loopback endpoint that serves relayed audio.

pub mod audio;
pub mod config;
pub mod connection;
pub mod handler;
pub mod listener;

pub use audio::{AudioRelayServer, AudioServerConfig};
pub use config::ServerConfig;
pub use connection::Connection;
pub use handler::dispatch;
pub use listener::SignalingServer;
