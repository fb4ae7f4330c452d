//! WebSocket signaling client
//!
//! High-level API for talking to a signaling service: create or join a room,
//! relay payloads, and receive membership events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::{Error, Result, SignalError};
use crate::protocol::{codec, ClientMessage, ServerMessage, SignalEnvelope};
use crate::registry::{JoinOutcome, MemberId, RoomId, RoomSnapshot};

use super::config::ClientConfig;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<ServerMessage>>>>;

/// Signaling service client
///
/// Every server message, acknowledgements included, is delivered on the
/// event channel returned by [`SignalingClient::connect`], starting with
/// `welcome`. Acknowledgements additionally complete the request that
/// caused them.
///
/// # Example
/// ```no_run
/// use rendezvous_rs::client::{ClientConfig, SignalingClient};
/// use rendezvous_rs::registry::RoomId;
///
/// # async fn example() -> rendezvous_rs::error::Result<()> {
/// let (client, mut events) =
///     SignalingClient::connect(ClientConfig::new("ws://localhost:3000")).await?;
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// let joined = client.join_room(&RoomId::from("R1"), Some("Bob"), None).await?;
/// println!("Others: {:?}", joined.others);
/// # Ok(())
/// # }
/// ```
pub struct SignalingClient {
    config: ClientConfig,
    member_id: MemberId,
    outgoing: mpsc::Sender<ClientMessage>,
    pending: PendingMap,
    next_request_id: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SignalingClient {
    /// Connect and wait for the service to assign a member id
    pub async fn connect(config: ClientConfig) -> Result<(Self, mpsc::Receiver<ServerMessage>)> {
        let (ws, _) = tokio::time::timeout(
            config.request_timeout,
            tokio_tungstenite::connect_async(config.url.as_str()),
        )
        .await
        .map_err(|_| Error::Timeout)??;
        let (mut sink, mut source) = ws.split();

        let welcome = tokio::time::timeout(config.request_timeout, next_server_message(&mut source))
            .await
            .map_err(|_| Error::Timeout)??;
        let member_id = match &welcome {
            ServerMessage::Welcome { member_id } => member_id.clone(),
            other => {
                return Err(SignalError::UnexpectedMessage(other.kind().to_string()).into());
            }
        };

        tracing::info!(url = %config.url, member = %member_id, "Connected to signaling service");

        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(config.channel_capacity);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        // Cannot fail: the receiver is still held here
        let _ = event_tx.send(welcome).await;

        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let text = match codec::encode(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::debug!(error = %e, "Signaling write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_pending = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            loop {
                let msg = match next_server_message(&mut source).await {
                    Ok(msg) => msg,
                    Err(Error::Signal(e)) => {
                        tracing::warn!(error = %e, "Dropping server message");
                        continue;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Signaling connection ended");
                        break;
                    }
                };

                if let Some(id) = msg.request_id() {
                    if let Some(waiter) = reader_pending.lock().await.remove(&id) {
                        let _ = waiter.send(msg.clone());
                    }
                }

                if event_tx.send(msg).await.is_err() {
                    tracing::debug!("Event receiver dropped");
                    break;
                }
            }

            // Wake every outstanding request
            reader_pending.lock().await.clear();
        });

        Ok((
            Self {
                config,
                member_id,
                outgoing: out_tx,
                pending,
                next_request_id: AtomicU64::new(1),
                reader,
                writer,
            },
            event_rx,
        ))
    }

    /// Member id assigned by the service
    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    /// Create a room and become its only member
    pub async fn create_room(
        &self,
        room_id: &RoomId,
        display_name: Option<&str>,
        color: Option<&str>,
    ) -> Result<RoomSnapshot> {
        let reply = self
            .request(|request_id| ClientMessage::CreateRoom {
                request_id: Some(request_id),
                room_id: room_id.clone(),
                display_name: display_name.map(str::to_string),
                color: color.map(str::to_string),
            })
            .await?;

        match reply {
            ServerMessage::RoomCreated {
                room_id, metadata, ..
            } => Ok(RoomSnapshot { room_id, metadata }),
            other => Err(rejection(other)),
        }
    }

    /// Join an existing room
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        display_name: Option<&str>,
        color: Option<&str>,
    ) -> Result<JoinOutcome> {
        let reply = self
            .request(|request_id| ClientMessage::JoinRoom {
                request_id: Some(request_id),
                room_id: room_id.clone(),
                display_name: display_name.map(str::to_string),
                color: color.map(str::to_string),
            })
            .await?;

        match reply {
            ServerMessage::RoomJoined {
                room_id,
                others,
                metadata,
                ..
            } => Ok(JoinOutcome {
                room_id,
                others,
                metadata,
            }),
            other => Err(rejection(other)),
        }
    }

    /// Leave a room
    pub async fn leave_room(&self, room_id: &RoomId) -> Result<()> {
        self.send(ClientMessage::LeaveRoom {
            room_id: room_id.clone(),
        })
        .await
    }

    /// Change display name and/or color
    pub async fn update_profile(
        &self,
        display_name: Option<&str>,
        color: Option<&str>,
    ) -> Result<()> {
        self.send(ClientMessage::UpdateProfile {
            display_name: display_name.map(str::to_string),
            color: color.map(str::to_string),
        })
        .await
    }

    /// Relay a negotiation payload
    pub async fn send_signal(&self, envelope: SignalEnvelope) -> Result<()> {
        self.send(ClientMessage::Signal {
            to: envelope.to,
            from: Some(envelope.from),
            payload: envelope.payload,
        })
        .await
    }

    /// Close the connection
    pub async fn close(self) {
        let Self {
            outgoing,
            reader,
            writer,
            ..
        } = self;

        drop(outgoing);
        let _ = writer.await;
        reader.abort();
    }

    async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.outgoing
            .send(msg)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    async fn request<B>(&self, build: B) -> Result<ServerMessage>
    where
        B: FnOnce(u64) -> ClientMessage,
    {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);

        if let Err(e) = self.send(build(request_id)).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(Error::Timeout)
            }
        }
    }
}

/// Turn an unexpected acknowledgement into an error
fn rejection(reply: ServerMessage) -> Error {
    match reply {
        ServerMessage::RequestFailed { code, message, .. } => Error::Request { code, message },
        other => SignalError::UnexpectedMessage(other.kind().to_string()).into(),
    }
}

/// Read until the next decodable server message
async fn next_server_message<S>(source: &mut S) -> Result<ServerMessage>
where
    S: futures_util::Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => return Ok(codec::decode_server(&text)?),
            Some(Ok(Message::Binary(data))) => {
                let text = std::str::from_utf8(&data)
                    .map_err(|e| SignalError::Malformed(format!("invalid UTF-8: {}", e)))?;
                return Ok(codec::decode_server(text)?);
            }
            Some(Ok(Message::Close(_))) | None => return Err(Error::ChannelClosed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}
