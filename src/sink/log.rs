// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! File-backed broker.
//!
//! Each topic partition is one append-only file, `<dir>/<topic>-<partition>.log`, holding
//! one JSON payload per line. A record is acknowledged only after its bytes are synced
//! to disk, and offsets resume from the existing line count after a reconnect.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{Ack, Broker, Producer, Record};
use crate::error::SinkError;

/// Durable local log
#[derive(Debug, Clone)]
pub struct LogBroker {
    dir: PathBuf,
    partitions: u32,
}

impl LogBroker {
    pub fn new(dir: impl Into<PathBuf>, partitions: u32) -> Self {
        Self {
            dir: dir.into(),
            partitions: partitions.max(1),
        }
    }

    /// Path of one partition file
    pub fn partition_path(&self, topic: &str, partition: u32) -> PathBuf {
        segment_path(&self.dir, topic, partition)
    }
}

fn segment_path(dir: &Path, topic: &str, partition: u32) -> PathBuf {
    dir.join(format!("{}-{}.log", topic, partition))
}

#[async_trait]
impl Broker for LogBroker {
    async fn connect(&self) -> Result<Box<dyn Producer>, SinkError> {
        fs::create_dir_all(&self.dir).await?;
        Ok(Box::new(LogProducer {
            dir: self.dir.clone(),
            partitions: self.partitions,
            segments: HashMap::new(),
        }))
    }

    fn describe(&self) -> String {
        format!("log://{}", self.dir.display())
    }
}

struct Segment {
    file: File,
    next_offset: u64,
}

struct LogProducer {
    dir: PathBuf,
    partitions: u32,
    segments: HashMap<(String, u32), Segment>,
}

impl LogProducer {
    async fn segment(&mut self, topic: &str, partition: u32) -> Result<&mut Segment, SinkError> {
        let key = (topic.to_string(), partition);
        if !self.segments.contains_key(&key) {
            let path = segment_path(&self.dir, topic, partition);
            let next_offset = match File::open(&path).await {
                Ok(file) => count_lines(file).await?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
                Err(e) => return Err(e.into()),
            };
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            self.segments
                .insert(key.clone(), Segment { file, next_offset });
        }
        self.segments
            .get_mut(&key)
            .ok_or_else(|| SinkError::Broker(format!("segment {}-{} unavailable", topic, partition)))
    }
}

/// Count newline-terminated records without loading the file
async fn count_lines(file: File) -> std::io::Result<u64> {
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut lines = 0u64;
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(lines);
        }
        lines += chunk.iter().filter(|b| **b == b'\n').count() as u64;
        let consumed = chunk.len();
        reader.consume(consumed);
    }
}

#[async_trait]
impl Producer for LogProducer {
    async fn send(&mut self, record: Record) -> Result<Ack, SinkError> {
        if record.partition >= self.partitions {
            return Err(SinkError::PartitionOutOfRange {
                partition: record.partition,
                partitions: self.partitions,
            });
        }

        let segment = self.segment(&record.topic, record.partition).await?;
        let mut line = record.payload;
        line.push(b'\n');
        segment.file.write_all(&line).await?;
        segment.file.sync_data().await?;

        let offset = segment.next_offset;
        segment.next_offset += 1;
        Ok(Ack {
            topic: record.topic,
            partition: record.partition,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(partition: u32, payload: &str) -> Record {
        Record {
            topic: "raw".to_string(),
            partition,
            key: "sensor_0".to_string(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_appends_and_acks() {
        let dir = tempfile::tempdir().unwrap();
        let broker = LogBroker::new(dir.path(), 3);
        let mut producer = broker.connect().await.unwrap();

        let a = producer.send(record(0, "{\"n\":1}")).await.unwrap();
        let b = producer.send(record(0, "{\"n\":2}")).await.unwrap();
        assert_eq!((a.offset, b.offset), (0, 1));

        let contents = std::fs::read_to_string(broker.partition_path("raw", 0)).unwrap();
        assert_eq!(contents, "{\"n\":1}\n{\"n\":2}\n");
    }

    #[tokio::test]
    async fn test_offsets_resume_after_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let broker = LogBroker::new(dir.path(), 3);

        let mut first = broker.connect().await.unwrap();
        first.send(record(2, "{}")).await.unwrap();
        first.send(record(2, "{}")).await.unwrap();
        drop(first);

        let mut second = broker.connect().await.unwrap();
        let ack = second.send(record(2, "{}")).await.unwrap();
        assert_eq!(ack.offset, 2);
    }

    #[tokio::test]
    async fn test_offsets_resume_past_buffer_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let broker = LogBroker::new(dir.path(), 1);

        // Larger than one read buffer, so counting spans several chunks
        let existing = "{\"temperature\":70.0}\n".repeat(5_000);
        std::fs::write(broker.partition_path("raw", 0), &existing).unwrap();

        let mut producer = broker.connect().await.unwrap();
        let ack = producer.send(record(0, "{}")).await.unwrap();
        assert_eq!(ack.offset, 5_000);
    }

    #[tokio::test]
    async fn test_rejects_unknown_partition() {
        let dir = tempfile::tempdir().unwrap();
        let broker = LogBroker::new(dir.path(), 3);
        let mut producer = broker.connect().await.unwrap();
        assert!(producer.send(record(3, "{}")).await.is_err());
    }
}
