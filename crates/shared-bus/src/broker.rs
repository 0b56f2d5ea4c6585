//! # Broadcast Broker
//!
//! Multi-producer, multi-consumer fan-out over `tokio::sync::broadcast`.
//! Suitable for single-process wiring between subsystems.

use crate::DEFAULT_CHANNEL_CAPACITY;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// A typed broadcast broker.
///
/// Cloning the broker shares the underlying channel. When constructed with
/// [`Broker::new_replay_last`], each new subscriber first receives the most
/// recently broadcast value (if any) before live values.
pub struct Broker<T: Clone> {
    sender: broadcast::Sender<T>,
    last: Option<Arc<Mutex<Option<T>>>>,
}

impl<T: Clone> Clone for Broker<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            last: self.last.clone(),
        }
    }
}

impl<T: Clone> Broker<T> {
    /// Create a broker with the default per-subscriber capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a broker with an explicit per-subscriber capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, last: None }
    }

    /// Create a broker that replays the last broadcast value to each new
    /// subscriber.
    pub fn new_replay_last() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            sender,
            last: Some(Arc::new(Mutex::new(None))),
        }
    }

    /// Broadcast a value to all current subscribers.
    ///
    /// Returns the number of subscribers that will observe the value.
    /// Publishing with no subscribers is not an error.
    pub fn broadcast(&self, value: T) -> usize {
        if let Some(last) = &self.last {
            *last.lock() = Some(value.clone());
        }
        match self.sender.send(value) {
            Ok(n) => n,
            Err(_) => {
                trace!("broadcast with no active subscribers");
                0
            }
        }
    }

    /// Subscribe to the broker.
    pub fn subscribe(&self) -> Subscription<T> {
        let receiver = self.sender.subscribe();
        let replay = self
            .last
            .as_ref()
            .and_then(|last| last.lock().clone());
        Subscription { replay, receiver }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for Broker<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription handle returned by [`Broker::subscribe`].
pub struct Subscription<T: Clone> {
    replay: Option<T>,
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Receive the next value.
    ///
    /// Returns `None` once the broker is dropped and the backlog is
    /// drained. Values missed due to a full buffer are skipped.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(v) = self.replay.take() {
            return Some(v);
        }
        loop {
            match self.receiver.recv().await {
                Ok(v) => return Some(v),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    trace!(skipped = n, "subscriber lagged, values dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive the next value without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        if let Some(v) = self.replay.take() {
            return Some(v);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(v) => return Some(v),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
