//! Local audio WebSocket endpoint
//!
//! Serves the [`AudioRelay`] to local consumers (an embedded view, a player)
//! over WebSocket. Every accepted client becomes a subscriber, is marked
//! open once the handshake completes, and receives each PCM chunk as one
//! binary message.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;
use crate::media::AudioRelay;

/// Audio endpoint configuration
#[derive(Debug, Clone)]
pub struct AudioServerConfig {
    /// Address to bind to (loopback with an ephemeral port by default)
    pub bind_addr: SocketAddr,
}

impl Default for AudioServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        }
    }
}

impl AudioServerConfig {
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }
}

/// WebSocket endpoint streaming relayed audio to local clients
pub struct AudioRelayServer {
    listener: TcpListener,
    relay: Arc<AudioRelay>,
}

impl AudioRelayServer {
    /// Bind the endpoint; use `local_addr` to learn the assigned port
    pub async fn bind(config: AudioServerConfig, relay: Arc<AudioRelay>) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "Audio endpoint listening");
        Ok(Self { listener, relay })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn relay(&self) -> &Arc<AudioRelay> {
        &self.relay
    }

    /// Accept clients until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Audio endpoint shutting down");
                Ok(())
            }
            result = self.accept_loop() => result,
        }
    }

    async fn accept_loop(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    let relay = Arc::clone(&self.relay);
                    tokio::spawn(async move {
                        if let Err(e) = serve_client(socket, relay).await {
                            tracing::debug!(peer = %peer_addr, error = %e, "Audio client error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept audio client");
                }
            }
        }
    }
}

async fn serve_client(socket: TcpStream, relay: Arc<AudioRelay>) -> Result<()> {
    let mut subscription = relay.subscribe().await;
    let id = subscription.id();

    let ws = match tokio_tungstenite::accept_async(socket).await {
        Ok(ws) => ws,
        Err(e) => {
            relay.unsubscribe(id).await;
            return Err(e.into());
        }
    };
    let (mut sink, mut source) = ws.split();

    subscription.open();
    tracing::debug!(subscriber = id, "Audio client connected");

    let result: Result<()> = loop {
        tokio::select! {
            chunk = subscription.recv() => {
                let Some(chunk) = chunk else { break Ok(()) };
                if let Err(e) = sink.send(Message::Binary(chunk.to_vec())).await {
                    break Err(e.into());
                }
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Err(e)) => break Err(e.into()),
                    Some(Ok(_)) => {}
                }
            }
        }
    };

    subscription.close();
    relay.unsubscribe(id).await;
    tracing::debug!(subscriber = id, "Audio client disconnected");

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    #[tokio::test]
    async fn test_client_receives_chunks_after_open() {
        let relay = Arc::new(AudioRelay::new());
        let server = AudioRelayServer::bind(AudioServerConfig::default(), relay.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert!(addr.ip().is_loopback());

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .unwrap();

        // Wait until the server side has marked the subscriber open
        tokio::time::timeout(Duration::from_secs(5), async {
            while relay.open_count().await == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(relay.publish(Bytes::from_static(&[1, 2, 3])).await, 1);

        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(msg, Message::Binary(vec![1, 2, 3]));

        ws.close(None).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while relay.subscriber_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let _ = stop_tx.send(());
        handle.await.unwrap().unwrap();
    }
}
