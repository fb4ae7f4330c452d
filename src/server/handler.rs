//! Client message dispatch
//!
//! Maps each client message kind to exactly one registry operation.

use crate::protocol::{ClientMessage, FailureCode, ServerMessage, SignalEnvelope};
use crate::registry::{MemberId, RegistryError, RoomRegistry};
use crate::stats::ServerStats;

/// Apply one client message on behalf of `member`
///
/// Returns the direct reply for request/acknowledge messages. Events for
/// other members are queued by the registry itself.
pub async fn dispatch(
    registry: &RoomRegistry,
    stats: &ServerStats,
    member: &MemberId,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::CreateRoom {
            request_id,
            room_id,
            display_name,
            color,
        } => {
            let result = registry
                .create_room(&room_id, member, display_name.as_deref(), color.as_deref())
                .await;

            Some(match result {
                Ok(snapshot) => ServerMessage::RoomCreated {
                    request_id,
                    room_id: snapshot.room_id,
                    metadata: snapshot.metadata,
                },
                Err(e) => failure(request_id, member, &e),
            })
        }

        ClientMessage::JoinRoom {
            request_id,
            room_id,
            display_name,
            color,
        } => {
            let result = registry
                .join_room(&room_id, member, display_name.as_deref(), color.as_deref())
                .await;

            Some(match result {
                Ok(outcome) => ServerMessage::RoomJoined {
                    request_id,
                    room_id: outcome.room_id,
                    others: outcome.others,
                    metadata: outcome.metadata,
                },
                Err(e) => failure(request_id, member, &e),
            })
        }

        ClientMessage::LeaveRoom { room_id } => {
            registry.leave_room(&room_id, member).await;
            None
        }

        ClientMessage::UpdateProfile {
            display_name,
            color,
        } => {
            if let Err(e) = registry
                .update_profile(member, display_name.as_deref(), color.as_deref())
                .await
            {
                tracing::debug!(member = %member, error = %e, "Profile update rejected");
            }
            None
        }

        ClientMessage::Signal { to, payload, .. } => {
            // The claimed sender is never trusted
            let envelope = SignalEnvelope {
                to,
                from: member.clone(),
                payload,
            };

            match registry.relay(envelope).await {
                Ok(()) => stats.signal_relayed(),
                Err(e) => {
                    stats.signal_dropped();
                    tracing::debug!(member = %member, error = %e, "Signal dropped");
                }
            }
            None
        }
    }
}

fn failure(request_id: Option<u64>, member: &MemberId, err: &RegistryError) -> ServerMessage {
    tracing::debug!(member = %member, error = %err, "Request failed");

    ServerMessage::RequestFailed {
        request_id,
        code: FailureCode::from(err),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SignalPayload;
    use crate::registry::RoomId;
    use tokio::sync::mpsc;

    async fn setup() -> (
        RoomRegistry,
        ServerStats,
        mpsc::Receiver<ServerMessage>,
        mpsc::Receiver<ServerMessage>,
    ) {
        let registry = RoomRegistry::new();
        let (alice_tx, alice_rx) = mpsc::channel(16);
        let (bob_tx, bob_rx) = mpsc::channel(16);
        registry.connect(MemberId::from("Alice"), alice_tx).await;
        registry.connect(MemberId::from("Bob"), bob_tx).await;
        (registry, ServerStats::new(), alice_rx, bob_rx)
    }

    fn create(request_id: u64, room: &str) -> ClientMessage {
        ClientMessage::CreateRoom {
            request_id: Some(request_id),
            room_id: RoomId::from(room),
            display_name: None,
            color: None,
        }
    }

    #[tokio::test]
    async fn test_create_acknowledged_with_request_id() {
        let (registry, stats, _a, _b) = setup().await;
        let alice = MemberId::from("Alice");

        let reply = dispatch(&registry, &stats, &alice, create(7, "R1")).await;
        match reply {
            Some(ServerMessage::RoomCreated {
                request_id,
                room_id,
                metadata,
            }) => {
                assert_eq!(request_id, Some(7));
                assert_eq!(room_id, RoomId::from("R1"));
                assert_eq!(metadata[&alice].display_name, "Anonymous");
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let (registry, stats, _a, _b) = setup().await;

        dispatch(&registry, &stats, &MemberId::from("Alice"), create(1, "R1")).await;
        let reply = dispatch(&registry, &stats, &MemberId::from("Bob"), create(2, "R1")).await;

        match reply {
            Some(ServerMessage::RequestFailed {
                request_id, code, ..
            }) => {
                assert_eq!(request_id, Some(2));
                assert_eq!(code, FailureCode::AlreadyExists);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_missing_room_fails() {
        let (registry, stats, _a, _b) = setup().await;

        let reply = dispatch(
            &registry,
            &stats,
            &MemberId::from("Bob"),
            ClientMessage::JoinRoom {
                request_id: None,
                room_id: RoomId::from("nope"),
                display_name: Some("Bob".into()),
                color: None,
            },
        )
        .await;

        assert!(matches!(
            reply,
            Some(ServerMessage::RequestFailed {
                code: FailureCode::NotFound,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_signal_sender_is_stamped() {
        let (registry, stats, _a, mut bob_rx) = setup().await;
        let alice = MemberId::from("Alice");
        let bob = MemberId::from("Bob");

        dispatch(&registry, &stats, &alice, create(1, "R1")).await;
        dispatch(
            &registry,
            &stats,
            &bob,
            ClientMessage::JoinRoom {
                request_id: None,
                room_id: RoomId::from("R1"),
                display_name: None,
                color: None,
            },
        )
        .await;
        while bob_rx.try_recv().is_ok() {}

        let reply = dispatch(
            &registry,
            &stats,
            &alice,
            ClientMessage::Signal {
                to: bob.clone(),
                from: Some(MemberId::from("Mallory")),
                payload: SignalPayload::Offer { sdp: "v=0".into() },
            },
        )
        .await;
        assert!(reply.is_none());

        match bob_rx.try_recv().unwrap() {
            ServerMessage::Signal(envelope) => assert_eq!(envelope.from, alice),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(stats.snapshot().signals_relayed, 1);
    }

    #[tokio::test]
    async fn test_signal_to_unknown_member_is_dropped() {
        let (registry, stats, mut alice_rx, _b) = setup().await;
        let alice = MemberId::from("Alice");

        dispatch(&registry, &stats, &alice, create(1, "R1")).await;
        while alice_rx.try_recv().is_ok() {}

        let reply = dispatch(
            &registry,
            &stats,
            &alice,
            ClientMessage::Signal {
                to: MemberId::from("ghost"),
                from: None,
                payload: SignalPayload::Answer { sdp: "v=0".into() },
            },
        )
        .await;

        assert!(reply.is_none());
        assert!(alice_rx.try_recv().is_err());
        assert_eq!(stats.snapshot().signals_dropped, 1);
    }

    #[tokio::test]
    async fn test_leave_has_no_reply() {
        let (registry, stats, _a, _b) = setup().await;
        let alice = MemberId::from("Alice");

        dispatch(&registry, &stats, &alice, create(1, "R1")).await;
        let reply = dispatch(
            &registry,
            &stats,
            &alice,
            ClientMessage::LeaveRoom {
                room_id: RoomId::from("R1"),
            },
        )
        .await;

        assert!(reply.is_none());
        assert!(!registry.room_exists(&RoomId::from("R1")).await);
    }
}
