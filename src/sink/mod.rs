// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Durable sink
//!
//! [`DurableSink`] publishes readings to an ordered, acknowledgment-backed broker.
//! Brokers plug in through the [`Broker`] and [`Producer`] traits:
//!
//! - [`memory::MemoryBroker`]: in-process partitioned log with fault injection
//! - [`log::LogBroker`]: one append-only file per partition, synced before ack
//!
//! Readings for one sensor always land on the same partition (`xxh64(key) mod partitions`),
//! which preserves per-sensor ordering. A failed send is logged, triggers a reconnect and
//! is reported to the caller; the message itself is not retried.

pub mod log;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use xxhash_rust::xxh64::xxh64;

use crate::config::SinkConfig;
use crate::error::SinkError;

/// One message addressed to a topic partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    /// Routing key (sensor id)
    pub key: String,
    /// Serialized message
    pub payload: Vec<u8>,
}

/// Broker acknowledgment of a stored record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub topic: String,
    pub partition: u32,
    /// Position of the record within its partition
    pub offset: u64,
}

/// Factory for producer connections
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a producer connection
    async fn connect(&self) -> Result<Box<dyn Producer>, SinkError>;

    /// Human-readable broker address for logs
    fn describe(&self) -> String;
}

/// An open, ordered producer connection
#[async_trait]
pub trait Producer: Send {
    /// Store one record; resolves only once every replica has acknowledged it
    async fn send(&mut self, record: Record) -> Result<Ack, SinkError>;
}

/// Partition for a routing key
///
/// Deterministic across calls and processes.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    (xxh64(key.as_bytes(), 0) % u64::from(partitions.max(1))) as u32
}

/// Connection-managing adapter over a [`Broker`]
///
/// Sends are serialized on the producer lock, which is held across the ack wait
/// and any reconnect. Connection state is tracked outside that lock so health
/// checks never queue behind a stalled send.
pub struct DurableSink {
    broker: Arc<dyn Broker>,
    producer: Mutex<Option<Box<dyn Producer>>>,
    connected: AtomicBool,
    config: SinkConfig,
}

impl DurableSink {
    /// Create a disconnected sink
    pub fn new(broker: Arc<dyn Broker>, config: SinkConfig) -> Self {
        Self {
            broker,
            producer: Mutex::new(None),
            connected: AtomicBool::new(false),
            config,
        }
    }

    /// Sink configuration
    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Whether a producer connection is open
    ///
    /// Stays true while a send on that connection is awaiting its ack.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Establish the producer connection, retrying with backoff
    pub async fn connect(&self) -> Result<(), SinkError> {
        let mut slot = self.producer.lock().await;
        self.connect_into(&mut slot).await
    }

    async fn connect_into(&self, slot: &mut Option<Box<dyn Producer>>) -> Result<(), SinkError> {
        let max_attempts = self.config.retry.max_attempts();
        let mut attempt = 0;
        loop {
            info!(
                broker = %self.broker.describe(),
                "Connecting to durable sink (attempt {}/{})",
                attempt + 1,
                max_attempts
            );
            match self.broker.connect().await {
                Ok(producer) => {
                    *slot = Some(producer);
                    self.connected.store(true, Ordering::Release);
                    info!("Connected to durable sink");
                    return Ok(());
                }
                Err(e) => {
                    error!("Durable sink connection attempt {} failed: {}", attempt + 1, e);
                    match self.config.retry.delay_for_attempt(attempt) {
                        Some(delay) => {
                            sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            *slot = None;
                            self.connected.store(false, Ordering::Release);
                            return Err(SinkError::Connection {
                                attempts: attempt + 1,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Send `message` to the partition owned by `partition_key`
    pub async fn send<T>(
        &self,
        topic: &str,
        message: &T,
        partition_key: &str,
    ) -> Result<Ack, SinkError>
    where
        T: Serialize + ?Sized,
    {
        let partition = partition_for(partition_key, self.config.partitions);
        self.send_to(topic, message, partition_key, partition).await
    }

    /// Send `message` to an explicit partition
    pub async fn send_to<T>(
        &self,
        topic: &str,
        message: &T,
        key: &str,
        partition: u32,
    ) -> Result<Ack, SinkError>
    where
        T: Serialize + ?Sized,
    {
        if partition >= self.config.partitions {
            return Err(SinkError::PartitionOutOfRange {
                partition,
                partitions: self.config.partitions,
            });
        }
        let payload = serde_json::to_vec(message)?;
        let record = Record {
            topic: topic.to_string(),
            partition,
            key: key.to_string(),
            payload,
        };

        let mut slot = self.producer.lock().await;
        if slot.is_none() {
            info!("No producer connection, connecting");
            self.connect_into(&mut slot).await?;
        }
        let Some(producer) = slot.as_mut() else {
            return Err(SinkError::Broker("producer unavailable".to_string()));
        };

        let failure = match timeout(self.config.send_timeout, producer.send(record)).await {
            Ok(Ok(ack)) => {
                debug!(
                    topic = %ack.topic,
                    partition = ack.partition,
                    offset = ack.offset,
                    "Record acknowledged"
                );
                return Ok(ack);
            }
            Ok(Err(e)) => e,
            Err(_) => SinkError::Timeout(self.config.send_timeout),
        };

        error!("Failed to send record to topic {}: {}", topic, failure);
        *slot = None;
        self.connected.store(false, Ordering::Release);
        if let Err(e) = self.connect_into(&mut slot).await {
            warn!("Reconnect after send failure did not succeed: {}", e);
        }
        Err(failure)
    }
}

impl std::fmt::Debug for DurableSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableSink")
            .field("broker", &self.broker.describe())
            .field("config", &self.config)
            .finish()
    }
}
