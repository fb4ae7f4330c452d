//! Glue between the signaling client and the peer manager

use tokio::sync::mpsc;

use crate::error::Result;
use crate::negotiation::{ConnectionFactory, PeerManager};
use crate::protocol::{ServerMessage, SignalEnvelope};

use super::signaling::SignalingClient;

/// Pump signaling events into a `PeerManager` and its payloads back out
///
/// `signals` must be the receiving half of the channel the manager was
/// created with. Runs until the event stream or the signal channel ends.
///
/// # Example
/// ```no_run
/// # use rendezvous_rs::client::{drive, ClientConfig, SignalingClient};
/// # use rendezvous_rs::negotiation::{ConnectionFactory, PeerManager};
/// # async fn example<F: ConnectionFactory>(factory: F) -> rendezvous_rs::error::Result<()> {
/// let (client, mut events) =
///     SignalingClient::connect(ClientConfig::new("ws://localhost:3000")).await?;
/// let (signal_tx, mut signal_rx) = tokio::sync::mpsc::unbounded_channel();
/// let mut manager = PeerManager::new(factory, signal_tx);
///
/// drive(&client, &mut events, &mut manager, &mut signal_rx).await
/// # }
/// ```
pub async fn drive<F>(
    client: &SignalingClient,
    events: &mut mpsc::Receiver<ServerMessage>,
    manager: &mut PeerManager<F>,
    signals: &mut mpsc::UnboundedReceiver<SignalEnvelope>,
) -> Result<()>
where
    F: ConnectionFactory,
{
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(msg) => manager.handle_server_message(msg).await,
                    None => {
                        tracing::debug!("Signaling events ended");
                        return Ok(());
                    }
                }
            }
            envelope = signals.recv() => {
                match envelope {
                    Some(envelope) => client.send_signal(envelope).await?,
                    None => return Ok(()),
                }
            }
        }
    }
}
