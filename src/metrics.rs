// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Dissemination statistics
//!
//! Lock-free counters updated by the dissemination loop and read by exporters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals of the dissemination loop
#[derive(Debug, Default)]
pub struct TelemetryStats {
    ticks: AtomicU64,
    readings_generated: AtomicU64,
    sink_delivered: AtomicU64,
    sink_failed: AtomicU64,
    subscriber_deliveries: AtomicU64,
    subscribers_dropped: AtomicU64,
    anomalies_injected: AtomicU64,
}

impl TelemetryStats {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self, readings: usize) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.readings_generated
            .fetch_add(readings as u64, Ordering::Relaxed);
    }

    pub fn record_sink(&self, delivered: bool) {
        if delivered {
            self.sink_delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sink_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_broadcast(&self, delivered: usize, dropped: usize) {
        self.subscriber_deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.subscribers_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn record_injections(&self, count: usize) {
        self.anomalies_injected
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            readings_generated: self.readings_generated.load(Ordering::Relaxed),
            sink_delivered: self.sink_delivered.load(Ordering::Relaxed),
            sink_failed: self.sink_failed.load(Ordering::Relaxed),
            subscriber_deliveries: self.subscriber_deliveries.load(Ordering::Relaxed),
            subscribers_dropped: self.subscribers_dropped.load(Ordering::Relaxed),
            anomalies_injected: self.anomalies_injected.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`TelemetryStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub readings_generated: u64,
    pub sink_delivered: u64,
    pub sink_failed: u64,
    pub subscriber_deliveries: u64,
    pub subscribers_dropped: u64,
    pub anomalies_injected: u64,
}

impl StatsSnapshot {
    /// Fraction of sink sends that were acknowledged (1.0 when nothing was sent)
    pub fn sink_success_rate(&self) -> f64 {
        let total = self.sink_delivered + self.sink_failed;
        if total == 0 {
            1.0
        } else {
            self.sink_delivered as f64 / total as f64
        }
    }
}
