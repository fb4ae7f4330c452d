//! rendezvous-rs: room rendezvous and peer signaling
//!
//! A small signaling service that lets browsers or native peers meet in a
//! named room and exchange the offers, answers and candidates they need to
//! open a direct connection, plus the local media plumbing used by a capture
//! host to turn an encoder's output into frames and audio chunks.
//!
//! # Server
//!
//! ```no_run
//! use rendezvous_rs::{ServerConfig, SignalingServer};
//!
//! #[tokio::main]
//! async fn main() -> rendezvous_rs::Result<()> {
//!     let server = SignalingServer::new(ServerConfig::default());
//!     server.run().await
//! }
//! ```
//!
//! # Client
//!
//! ```no_run
//! use rendezvous_rs::client::{ClientConfig, SignalingClient};
//! use rendezvous_rs::registry::RoomId;
//!
//! # async fn example() -> rendezvous_rs::Result<()> {
//! let (client, _events) =
//!     SignalingClient::connect(ClientConfig::new("ws://localhost:3000")).await?;
//! let room = client.create_room(&RoomId::from("R1"), Some("Alice"), None).await?;
//! println!("Created {}", room.room_id);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod media;
pub mod negotiation;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;

pub use client::{ClientConfig, SignalingClient};
pub use error::{Error, Result};
pub use media::{AudioRelay, CaptureSession, FrameDemuxer};
pub use negotiation::{PeerConnection, PeerManager};
pub use protocol::{ClientMessage, ServerMessage, SignalEnvelope, SignalPayload};
pub use registry::{MemberId, RoomId, RoomRegistry};
pub use server::{ServerConfig, SignalingServer};
