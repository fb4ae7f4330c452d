//! Room registry for membership and signal routing
//!
//! The registry owns every live room and the connection record of every
//! connected member. Connection tasks hand it their outbound queue on connect;
//! membership events and relayed signals are pushed into those queues.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<RoomRegistry>
//!                     ┌─────────────────────────┐
//!                     │ rooms: HashMap<RoomId,  │
//!                     │   Room { members,       │
//!                     │          metadata }>    │
//!                     │ members: HashMap<Id,    │
//!                     │   MemberEntry { outbox, │
//!                     │                 room }> │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Connection A]          [Connection B]          [Connection C]
//!    join_room()             outbox.recv()           outbox.recv()
//!         │                       │                       │
//!         └──► registry.relay() ──► writer task ──► WebSocket
//! ```
//!
//! Rooms exist only while they have at least one member. A member belongs to
//! at most one room at a time.

pub mod config;
pub mod entry;
pub mod error;
pub mod member;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{JoinOutcome, Room, RoomMetadata, RoomSnapshot};
pub use error::RegistryError;
pub use member::{MemberId, MemberInfo, RoomId};
pub use store::RoomRegistry;
