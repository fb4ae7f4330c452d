//! Signaling client implementation
//!
//! Provides the client side of the rendezvous protocol:
//! - Connecting to a signaling service and creating or joining rooms
//! - Driving a `PeerManager` from the service's events

pub mod config;
pub mod session;
pub mod signaling;

pub use config::ClientConfig;
pub use session::drive;
pub use signaling::SignalingClient;
