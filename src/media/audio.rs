//! Audio relay bridge
//!
//! Fans raw PCM chunks out to local subscribers without parsing them. Only
//! subscribers in the `Open` state receive chunks; a subscriber that is still
//! connecting, closing, or too slow to keep up simply misses them. Missed
//! chunks are never replayed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

/// Default per-subscriber queue capacity in chunks
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Subscriber lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriberState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl SubscriberState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SubscriberState::Connecting,
            1 => SubscriberState::Open,
            2 => SubscriberState::Closing,
            _ => SubscriberState::Closed,
        }
    }
}

/// Audio relay configuration
#[derive(Debug, Clone)]
pub struct AudioRelayConfig {
    /// Chunks queued per subscriber before new chunks are dropped for it
    pub subscriber_capacity: usize,
}

impl Default for AudioRelayConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

impl AudioRelayConfig {
    /// Set the per-subscriber queue capacity
    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }
}

#[derive(Debug)]
struct SubscriberEntry {
    tx: mpsc::Sender<Bytes>,
    state: Arc<AtomicU8>,
}

impl SubscriberEntry {
    fn state(&self) -> SubscriberState {
        SubscriberState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Handle held by one subscriber
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    state: Arc<AtomicU8>,
    rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SubscriberState {
        SubscriberState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Start receiving chunks
    pub fn open(&self) {
        let _ = self.state.compare_exchange(
            SubscriberState::Connecting as u8,
            SubscriberState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Stop receiving chunks; already queued chunks can still be drained
    pub fn close(&self) {
        if self.state() != SubscriberState::Closed {
            self.state
                .store(SubscriberState::Closing as u8, Ordering::Release);
        }
    }

    /// Receive the next chunk
    ///
    /// Returns `None` once the relay has dropped this subscriber and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.state
            .store(SubscriberState::Closed as u8, Ordering::Release);
    }
}

/// Fan-out of raw audio chunks to local subscribers
pub struct AudioRelay {
    subscribers: RwLock<HashMap<u64, SubscriberEntry>>,
    next_id: AtomicU64,
    config: AudioRelayConfig,
}

impl AudioRelay {
    pub fn new() -> Self {
        Self::with_config(AudioRelayConfig::default())
    }

    pub fn with_config(config: AudioRelayConfig) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Register a subscriber in the `Connecting` state
    pub async fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.subscriber_capacity);
        let state = Arc::new(AtomicU8::new(SubscriberState::Connecting as u8));

        self.subscribers.write().await.insert(
            id,
            SubscriberEntry {
                tx,
                state: state.clone(),
            },
        );

        tracing::debug!(subscriber = id, "Audio subscriber added");
        Subscription { id, state, rx }
    }

    /// Remove a subscriber
    pub async fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.subscribers.write().await.remove(&id);
        if let Some(entry) = &removed {
            entry
                .state
                .store(SubscriberState::Closed as u8, Ordering::Release);
            tracing::debug!(subscriber = id, "Audio subscriber removed");
        }
        removed.is_some()
    }

    /// Push a chunk to every open subscriber
    ///
    /// Returns the number of subscribers the chunk was queued for.
    pub async fn publish(&self, chunk: Bytes) -> usize {
        let mut delivered = 0;
        let mut stale = Vec::new();

        {
            let subscribers = self.subscribers.read().await;
            for (id, entry) in subscribers.iter() {
                match entry.state() {
                    SubscriberState::Open => {}
                    SubscriberState::Closed => {
                        stale.push(*id);
                        continue;
                    }
                    _ => continue,
                }

                match entry.tx.try_send(chunk.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::trace!(subscriber = id, "Audio subscriber lagging, chunk dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => stale.push(*id),
                }
            }
        }

        if !stale.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in stale {
                subscribers.remove(&id);
            }
        }

        delivered
    }

    /// Number of registered subscribers in any state
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Number of subscribers currently receiving chunks
    pub async fn open_count(&self) -> usize {
        self.subscribers
            .read()
            .await
            .values()
            .filter(|entry| entry.state() == SubscriberState::Open)
            .count()
    }
}

impl Default for AudioRelay {
    fn default() -> Self {
        Self::new()
    }
}
