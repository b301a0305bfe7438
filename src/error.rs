// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Fleetsim
//!
//! Caller faults ([`FleetError::UnknownSensor`], [`FleetError::InvalidConfig`]) are kept
//! apart from infrastructure faults ([`SinkError`]) so callers can branch on the variant.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for Fleetsim operations
pub type Result<T> = std::result::Result<T, FleetError>;

/// Main error type for Fleetsim operations
#[derive(Error, Debug)]
pub enum FleetError {
    /// Operation referenced a sensor id that is not registered
    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    /// Rejected configuration (non-positive frequency, zero partitions, ...)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Anomaly kind outside the enumerated set while strict validation is enabled
    #[error("Unknown anomaly kind: {0}")]
    UnknownAnomalyKind(String),

    /// Durable sink failure
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors raised by the durable sink and its brokers
#[derive(Error, Debug)]
pub enum SinkError {
    /// Every connection attempt failed
    #[error("Connection failed after {attempts} attempts: {reason}")]
    Connection { attempts: u32, reason: String },

    /// Broker rejected or lost the record
    #[error("Broker error: {0}")]
    Broker(String),

    /// Acknowledgment did not arrive in time
    #[error("Acknowledgment timed out after {0:?}")]
    Timeout(Duration),

    /// Partition outside the configured range
    #[error("Partition {partition} out of range (partitions: {partitions})")]
    PartitionOutOfRange { partition: u32, partitions: u32 },

    /// Payload serialization failed
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Storage I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// Whether this is an exhausted connection (fatal at startup)
    pub fn is_connection(&self) -> bool {
        matches!(self, SinkError::Connection { .. })
    }
}

/// Failure to push one message to one live subscriber
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Subscriber queue is full
    #[error("subscriber queue full")]
    Full,

    /// Subscriber went away
    #[error("subscriber closed")]
    Closed,

    /// Push exceeded the per-subscriber deadline
    #[error("push timed out")]
    Timeout,
}
