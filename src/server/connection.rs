//! Per-connection signaling task
//!
//! Each accepted socket is upgraded to a WebSocket and split in two:
//!
//! ```text
//!  socket ──► read loop ──► dispatch() ──► RoomRegistry
//!                 │ reply                       │ events, relayed signals
//!                 ▼                             ▼
//!               outbox (mpsc) ◄─────────────────┘
//!                 │
//!                 ▼
//!            writer task ──► socket
//! ```
//!
//! Replies and registry events share one outbox, so a member observes them
//! in the order they were produced.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::{Error, Result, SignalError};
use crate::protocol::{codec, ClientMessage, ServerMessage};
use crate::registry::{MemberId, RoomRegistry};
use crate::server::config::ServerConfig;
use crate::server::handler::dispatch;
use crate::stats::ServerStats;

/// One client connection
pub struct Connection {
    session_id: u64,
    member: MemberId,
    peer_addr: SocketAddr,
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    stats: Arc<ServerStats>,
}

impl Connection {
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<RoomRegistry>,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            session_id,
            member: MemberId::from_session(session_id),
            peer_addr,
            config,
            registry,
            stats,
        }
    }

    /// Member id assigned to this connection
    pub fn member(&self) -> &MemberId {
        &self.member
    }

    /// Run the connection until the client goes away
    ///
    /// The member is removed from the registry on every exit path after the
    /// handshake, so an abrupt disconnect behaves like leaving every room.
    pub async fn run(self, socket: TcpStream) -> Result<()> {
        let ws = tokio::time::timeout(
            self.config.handshake_timeout,
            tokio_tungstenite::accept_async(socket),
        )
        .await
        .map_err(|_| Error::Timeout)??;

        tracing::debug!(
            session_id = self.session_id,
            member = %self.member,
            peer = %self.peer_addr,
            "WebSocket established"
        );

        let (outbox_tx, outbox_rx) = mpsc::channel(self.config.outbox_capacity);

        outbox_tx
            .send(ServerMessage::Welcome {
                member_id: self.member.clone(),
            })
            .await
            .map_err(|_| Error::ChannelClosed)?;
        self.registry
            .connect(self.member.clone(), outbox_tx.clone())
            .await;

        let (sink, source) = ws.split();
        let writer = tokio::spawn(write_loop(
            sink,
            outbox_rx,
            self.stats.clone(),
            self.member.clone(),
            self.config.ping_interval(),
        ));

        let result = self.read_loop(source, &outbox_tx).await;

        self.registry.disconnect(&self.member).await;
        drop(outbox_tx);

        // The writer drains what is already queued, then closes the socket
        if tokio::time::timeout(self.config.handshake_timeout, writer)
            .await
            .is_err()
        {
            tracing::debug!(member = %self.member, "Writer did not finish in time");
        }

        result
    }

    async fn read_loop(
        &self,
        mut source: futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
        outbox: &mpsc::Sender<ServerMessage>,
    ) -> Result<()> {
        loop {
            let next = match tokio::time::timeout(self.config.idle_timeout, source.next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::debug!(member = %self.member, "Idle timeout");
                    return Ok(());
                }
            };

            let msg = match next {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            };

            let decoded = match msg {
                Message::Text(text) => codec::decode_client(&text, self.config.max_message_size),
                Message::Binary(data) => {
                    codec::decode_client_bytes(&data, self.config.max_message_size)
                }
                Message::Close(_) => return Ok(()),
                // Any frame counts as activity; pings are answered by tungstenite
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            match decoded {
                Ok(msg) => {
                    self.stats.message_received();
                    self.handle(msg, outbox).await?;
                }
                Err(e) => self.reject(e),
            }
        }
    }

    async fn handle(&self, msg: ClientMessage, outbox: &mpsc::Sender<ServerMessage>) -> Result<()> {
        tracing::debug!(member = %self.member, kind = msg.kind(), "Client message");

        if let Some(reply) = dispatch(&self.registry, &self.stats, &self.member, msg).await {
            outbox.send(reply).await.map_err(|_| Error::ChannelClosed)?;
        }
        Ok(())
    }

    fn reject(&self, err: SignalError) {
        self.stats.malformed_message();
        tracing::warn!(member = %self.member, error = %err, "Dropping client message");
    }
}

async fn write_loop(
    mut sink: futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
    mut outbox: mpsc::Receiver<ServerMessage>,
    stats: Arc<ServerStats>,
    member: MemberId,
    ping_interval: Duration,
) {
    // Quiet members answer pings, which keeps their read loop alive
    let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = outbox.recv() => {
                let Some(msg) = msg else { break };
                let text = match codec::encode(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(member = %member, error = %e, "Failed to encode message");
                        continue;
                    }
                };

                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::debug!(member = %member, error = %e, "Write failed");
                    return;
                }
                stats.message_sent();
            }
            _ = ping.tick() => {
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    tracing::debug!(member = %member, error = %e, "Ping failed");
                    return;
                }
            }
        }
    }

    let _ = sink.close().await;
}
