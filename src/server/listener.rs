//! Signaling server listener
//!
//! Handles TCP accept loop and spawns connection handlers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::registry::{RegistryConfig, RoomRegistry};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::stats::ServerStats;

/// WebSocket signaling server
pub struct SignalingServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    stats: Arc<ServerStats>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl SignalingServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry_config(config, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(config: ServerConfig, registry_config: RegistryConfig) -> Self {
        Self::with_registry(config, Arc::new(RoomRegistry::with_config(registry_config)))
    }

    /// Create a new server around an existing registry
    pub fn with_registry(config: ServerConfig, registry: Arc<RoomRegistry>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            registry,
            stats: Arc::new(ServerStats::new()),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the room registry
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Get the server counters
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the process exits.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Signaling server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.stats.connection_rejected();
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let connection = Connection::new(
            session_id,
            peer_addr,
            self.config.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
        );
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            // Held for the lifetime of the connection
            let _permit = permit;
            stats.connection_opened();

            if let Err(e) = connection.run(socket).await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            stats.connection_closed();
            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, SignalingClient};
    use crate::error::Error;
    use crate::protocol::{FailureCode, ServerMessage, SignalEnvelope, SignalPayload};
    use crate::registry::{MemberId, RoomId};
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::Message;

    struct TestServer {
        server: Arc<SignalingServer>,
        url: String,
        stop: oneshot::Sender<()>,
        handle: JoinHandle<Result<()>>,
    }

    impl TestServer {
        async fn start(config: ServerConfig) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("ws://{}", listener.local_addr().unwrap());
            let server = Arc::new(SignalingServer::new(config));

            let (stop, stop_rx) = oneshot::channel::<()>();
            let task_server = Arc::clone(&server);
            let handle = tokio::spawn(async move {
                task_server
                    .serve(listener, async {
                        let _ = stop_rx.await;
                    })
                    .await
            });

            Self {
                server,
                url,
                stop,
                handle,
            }
        }

        async fn connect(&self) -> (SignalingClient, mpsc::Receiver<ServerMessage>) {
            SignalingClient::connect(
                ClientConfig::new(self.url.clone()).request_timeout(Duration::from_secs(5)),
            )
            .await
            .unwrap()
        }

        async fn shutdown(self) {
            let _ = self.stop.send(());
            self.handle.await.unwrap().unwrap();
        }
    }

    async fn next_event(events: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_two_members_meet_and_relay() {
        let server = TestServer::start(ServerConfig::default()).await;

        let (alice, mut alice_events) = server.connect().await;
        let (bob, mut bob_events) = server.connect().await;
        assert_ne!(alice.member_id(), bob.member_id());

        assert_eq!(
            next_event(&mut alice_events).await,
            ServerMessage::Welcome {
                member_id: alice.member_id().clone()
            }
        );
        assert!(matches!(
            next_event(&mut bob_events).await,
            ServerMessage::Welcome { .. }
        ));

        let room = RoomId::from("R1");
        let created = alice.create_room(&room, Some("Alice"), None).await.unwrap();
        assert_eq!(created.room_id, room);
        assert_eq!(created.metadata.len(), 1);
        assert!(matches!(
            next_event(&mut alice_events).await,
            ServerMessage::RoomCreated { .. }
        ));

        let joined = bob.join_room(&room, Some("Bob"), None).await.unwrap();
        assert_eq!(joined.others, vec![alice.member_id().clone()]);
        assert_eq!(joined.metadata.len(), 2);

        assert_eq!(
            next_event(&mut alice_events).await,
            ServerMessage::PeerJoined {
                member_id: bob.member_id().clone(),
                display_name: "Bob".into(),
            }
        );
        match next_event(&mut alice_events).await {
            ServerMessage::RoomMeta { room_id, metadata } => {
                assert_eq!(room_id, room);
                assert_eq!(metadata[bob.member_id()].display_name, "Bob");
            }
            other => panic!("unexpected {:?}", other),
        }

        // The claimed sender is replaced by the real one
        bob.send_signal(SignalEnvelope {
            to: alice.member_id().clone(),
            from: MemberId::from("forged"),
            payload: SignalPayload::Offer { sdp: "v=0".into() },
        })
        .await
        .unwrap();

        assert_eq!(
            next_event(&mut alice_events).await,
            ServerMessage::Signal(SignalEnvelope {
                to: alice.member_id().clone(),
                from: bob.member_id().clone(),
                payload: SignalPayload::Offer { sdp: "v=0".into() },
            })
        );

        let stats = server.server.stats().snapshot();
        assert_eq!(stats.signals_relayed, 1);
        assert_eq!(stats.active_connections, 2);

        alice.close().await;
        bob.close().await;
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_notifies_room() {
        let server = TestServer::start(ServerConfig::default()).await;

        let (alice, mut alice_events) = server.connect().await;
        let (bob, _bob_events) = server.connect().await;
        let bob_id = bob.member_id().clone();

        let room = RoomId::from("R2");
        alice.create_room(&room, Some("Alice"), None).await.unwrap();
        bob.join_room(&room, Some("Bob"), None).await.unwrap();

        // Skip welcome, room-created, peer-joined and room-meta
        for _ in 0..4 {
            next_event(&mut alice_events).await;
        }

        bob.close().await;

        assert_eq!(
            next_event(&mut alice_events).await,
            ServerMessage::PeerLeft { member_id: bob_id }
        );
        match next_event(&mut alice_events).await {
            ServerMessage::RoomMeta { metadata, .. } => assert_eq!(metadata.len(), 1),
            other => panic!("unexpected {:?}", other),
        }

        let registry = Arc::clone(server.server.registry());
        eventually(|| {
            let registry = Arc::clone(&registry);
            async move { registry.member_count().await == 1 }
        })
        .await;

        alice.close().await;
        eventually(|| {
            let registry = Arc::clone(&registry);
            async move { registry.room_count().await == 0 }
        })
        .await;

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_quiet_members_outlive_idle_timeout() {
        let config = ServerConfig::default().idle_timeout(Duration::from_millis(300));
        let server = TestServer::start(config).await;

        let (alice, mut alice_events) = server.connect().await;
        let (bob, _bob_events) = server.connect().await;

        let room = RoomId::from("R-quiet");
        alice.create_room(&room, Some("Alice"), None).await.unwrap();
        bob.join_room(&room, Some("Bob"), None).await.unwrap();

        // Skip welcome, room-created, peer-joined and room-meta
        for _ in 0..4 {
            next_event(&mut alice_events).await;
        }

        // Several idle periods with no application traffic
        tokio::time::sleep(Duration::from_secs(1)).await;

        let registry = server.server.registry();
        assert_eq!(registry.member_count().await, 2);
        assert_eq!(registry.room_members(&room).await.map(|m| m.len()), Some(2));
        assert!(alice_events.try_recv().is_err());

        alice.close().await;
        bob.close().await;
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_join_unknown_room_fails() {
        let server = TestServer::start(ServerConfig::default()).await;
        let (client, _events) = server.connect().await;

        let err = client
            .join_room(&RoomId::from("missing"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Request {
                code: FailureCode::NotFound,
                ..
            }
        ));

        let err = client
            .create_room(&RoomId::from("   "), None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Request {
                code: FailureCode::InvalidRoom,
                ..
            }
        ));

        client.close().await;
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_message_keeps_connection() {
        let server = TestServer::start(ServerConfig::default()).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(server.url.as_str())
            .await
            .unwrap();

        let welcome = ws.next().await.unwrap().unwrap();
        assert!(welcome.to_text().unwrap().contains("\"welcome\""));

        ws.send(Message::Text("not json".into())).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"create-room","requestId":9,"roomId":"R3"}"#.into(),
        ))
        .await
        .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let reply = crate::protocol::codec::decode_server(reply.to_text().unwrap()).unwrap();
        assert_eq!(reply.request_id(), Some(9));
        assert!(matches!(reply, ServerMessage::RoomCreated { .. }));

        assert_eq!(server.server.stats().snapshot().malformed_messages, 1);

        ws.close(None).await.unwrap();
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_connection_limit_rejects_extra_clients() {
        let server = TestServer::start(ServerConfig::default().max_connections(1)).await;
        let (first, _events) = server.connect().await;

        let second = SignalingClient::connect(
            ClientConfig::new(server.url.clone()).request_timeout(Duration::from_secs(2)),
        )
        .await;
        assert!(second.is_err());
        assert_eq!(server.server.stats().snapshot().rejected_connections, 1);

        first.close().await;
        server.shutdown().await;
    }
}
