// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Best-effort fan-out to live subscribers.
//!
//! ```text
//! broadcast(msg)
//!     │  snapshot of live handles
//!     ├──► sub-1.push(msg) ──► ok
//!     ├──► sub-2.push(msg) ──► Full / Closed / Timeout ──► unregister sub-2
//!     └──► sub-N.push(msg) ──► ok
//! ```
//!
//! Pushes run concurrently, each bounded by the push timeout, so one slow consumer
//! never holds up the others. A handle is removed after its first failed push; there
//! is no retry and no backpressure towards the producer.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::anomaly::SensorState;
use crate::error::PushError;
use crate::reading::Reading;

/// Message pushed to live subscribers, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Broadcast {
    /// One reading
    SensorReading(Reading),
    /// Anomaly summary of every sensor, sent once per tick
    SensorStates(BTreeMap<String, SensorState>),
}

/// Opaque token identifying one live subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberHandle(u64);

impl fmt::Display for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A consumer that can receive broadcasts
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Deliver one message; any error unregisters the subscriber
    async fn push(&self, message: Arc<Broadcast>) -> Result<(), PushError>;
}

/// Subscriber backed by a bounded channel; never waits for queue space
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    sender: mpsc::Sender<Arc<Broadcast>>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiving end of its queue
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<Broadcast>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn push(&self, message: Arc<Broadcast>) -> Result<(), PushError> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Registry of live subscribers
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    live: RwLock<HashMap<SubscriberHandle, Arc<dyn Subscriber>>>,
    push_timeout: Duration,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new(push_timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            live: RwLock::new(HashMap::new()),
            push_timeout,
        }
    }

    /// Register a subscriber under a fresh handle
    pub async fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberHandle {
        let handle = SubscriberHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.live.write().await.insert(handle, subscriber);
        debug!(subscriber = %handle, "Subscriber registered");
        handle
    }

    /// Register a [`ChannelSubscriber`] and return its queue
    pub async fn subscribe_channel(
        &self,
        capacity: usize,
    ) -> (SubscriberHandle, mpsc::Receiver<Arc<Broadcast>>) {
        let (subscriber, receiver) = ChannelSubscriber::new(capacity);
        let handle = self.register(Arc::new(subscriber)).await;
        (handle, receiver)
    }

    /// Remove a subscriber; returns false if it was already gone
    pub async fn unregister(&self, handle: SubscriberHandle) -> bool {
        let removed = self.live.write().await.remove(&handle).is_some();
        if removed {
            debug!(subscriber = %handle, "Subscriber unregistered");
        }
        removed
    }

    /// Check if a handle is live
    pub async fn contains(&self, handle: SubscriberHandle) -> bool {
        self.live.read().await.contains_key(&handle)
    }

    /// Number of live subscribers
    pub async fn len(&self) -> usize {
        self.live.read().await.len()
    }

    /// Check if nobody is subscribed
    pub async fn is_empty(&self) -> bool {
        self.live.read().await.is_empty()
    }

    /// Push `message` to every live subscriber, dropping those that fail
    pub async fn broadcast(&self, message: Broadcast) -> BroadcastReport {
        let snapshot: Vec<(SubscriberHandle, Arc<dyn Subscriber>)> = self
            .live
            .read()
            .await
            .iter()
            .map(|(handle, sub)| (*handle, Arc::clone(sub)))
            .collect();
        if snapshot.is_empty() {
            return BroadcastReport::default();
        }

        let message = Arc::new(message);
        let pushes = snapshot.iter().map(|(handle, sub)| {
            let message = Arc::clone(&message);
            async move {
                let outcome = match timeout(self.push_timeout, sub.push(message)).await {
                    Ok(result) => result,
                    Err(_) => Err(PushError::Timeout),
                };
                (*handle, outcome)
            }
        });

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (handle, outcome) in join_all(pushes).await {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(subscriber = %handle, "Push failed, dropping subscriber: {}", e);
                    failed.push(handle);
                }
            }
        }

        if !failed.is_empty() {
            let mut live = self.live.write().await;
            for handle in &failed {
                live.remove(handle);
            }
        }
        report.dropped = failed.len();
        report
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("next_id", &self.next_id)
            .field("push_timeout", &self.push_timeout)
            .finish()
    }
}
