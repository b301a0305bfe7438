// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! In-memory broker for tests and local runs.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Ack, Broker, Producer, Record};
use crate::error::SinkError;

/// Records retained per partition by [`MemoryBroker::new`]
pub const DEFAULT_RETENTION: usize = 10_000;

/// Tail of one partition; older records are evicted once `retention` is reached
#[derive(Debug, Clone, Default)]
struct Partition {
    /// Offset of the oldest retained record
    base_offset: u64,
    records: VecDeque<Record>,
}

impl Partition {
    fn append(&mut self, record: Record, retention: usize) -> u64 {
        let offset = self.base_offset + self.records.len() as u64;
        self.records.push_back(record);
        while self.records.len() > retention {
            self.records.pop_front();
            self.base_offset += 1;
        }
        offset
    }
}

#[derive(Debug, Default)]
struct MemoryLog {
    /// topic -> partition -> retained tail
    topics: HashMap<String, Vec<Partition>>,
    failing_connects: u32,
    failing_sends: u32,
    connects: u32,
    ack_delay: Option<Duration>,
}

/// A partitioned in-process log
///
/// Clones share the same log, so a test can keep one handle for inspection
/// while the engine owns another. Each partition keeps only its most recent
/// `retention` records; offsets keep counting past evicted ones.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    partitions: u32,
    retention: usize,
    log: Arc<Mutex<MemoryLog>>,
}

impl MemoryBroker {
    /// Create an empty broker with `partitions` partitions per topic
    pub fn new(partitions: u32) -> Self {
        Self::with_retention(partitions, DEFAULT_RETENTION)
    }

    /// Create an empty broker keeping at most `retention` records per partition
    pub fn with_retention(partitions: u32, retention: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            retention: retention.max(1),
            log: Arc::new(Mutex::new(MemoryLog::default())),
        }
    }

    /// Records kept per partition
    pub fn retention(&self) -> usize {
        self.retention
    }

    fn lock(&self) -> MutexGuard<'_, MemoryLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `n` connection attempts fail
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().failing_connects = n;
    }

    /// Make the next `n` sends fail
    pub fn fail_next_sends(&self, n: u32) {
        self.lock().failing_sends = n;
    }

    /// Delay every acknowledgment by `delay`
    pub fn set_ack_delay(&self, delay: Option<Duration>) {
        self.lock().ack_delay = delay;
    }

    /// Number of successful connections so far
    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    /// Records retained in one partition, oldest first
    pub fn records(&self, topic: &str, partition: u32) -> Vec<Record> {
        self.lock()
            .topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .map(|p| p.records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Offset the next record in a partition will receive
    pub fn next_offset(&self, topic: &str, partition: u32) -> u64 {
        self.lock()
            .topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .map(|p| p.base_offset + p.records.len() as u64)
            .unwrap_or(0)
    }

    /// Total records retained in a topic
    pub fn len(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().map(|p| p.records.len()).sum())
            .unwrap_or(0)
    }

    /// Check if a topic holds no records
    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PARTITIONS)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn Producer>, SinkError> {
        let mut log = self.lock();
        if log.failing_connects > 0 {
            log.failing_connects -= 1;
            return Err(SinkError::Broker("connection refused".to_string()));
        }
        log.connects += 1;
        Ok(Box::new(MemoryProducer {
            partitions: self.partitions,
            retention: self.retention,
            log: Arc::clone(&self.log),
        }))
    }

    fn describe(&self) -> String {
        format!("memory ({} partitions)", self.partitions)
    }
}

struct MemoryProducer {
    partitions: u32,
    retention: usize,
    log: Arc<Mutex<MemoryLog>>,
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn send(&mut self, record: Record) -> Result<Ack, SinkError> {
        if record.partition >= self.partitions {
            return Err(SinkError::PartitionOutOfRange {
                partition: record.partition,
                partitions: self.partitions,
            });
        }

        let delay = {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            if log.failing_sends > 0 {
                log.failing_sends -= 1;
                return Err(SinkError::Broker("not enough replicas".to_string()));
            }
            log.ack_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let partitions = log
            .topics
            .entry(record.topic.clone())
            .or_insert_with(|| vec![Partition::default(); self.partitions as usize]);
        let topic = record.topic.clone();
        let partition = record.partition;
        let offset = partitions[partition as usize].append(record, self.retention);
        Ok(Ack {
            topic,
            partition,
            offset,
        })
    }
}
