// Fleetsim Server - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the telemetry engine.
//!
//! Values are copied from the engine's statistics when `/metrics` is scraped, so
//! the dissemination loop never touches the registry.

use fleetsim::{LoopState, StatsSnapshot};
use lazy_static::lazy_static;
use prometheus::{register_gauge, Encoder, Gauge, TextEncoder};
use tracing::error;

lazy_static! {
    // ============================================================
    // Fleet
    // ============================================================

    /// Registered sensors.
    pub static ref SENSOR_COUNT: Gauge = register_gauge!(
        "fleetsim_sensors",
        "Number of configured sensors"
    ).unwrap();

    /// Current tick frequency.
    pub static ref FREQUENCY_HZ: Gauge = register_gauge!(
        "fleetsim_frequency_hz",
        "Dissemination loop frequency in hertz"
    ).unwrap();

    /// 1 once the dissemination loop runs.
    pub static ref LOOP_RUNNING: Gauge = register_gauge!(
        "fleetsim_loop_running",
        "Dissemination loop state (1=running, 0=not started)"
    ).unwrap();

    /// Sensors with an active anomaly.
    pub static ref ACTIVE_ANOMALIES: Gauge = register_gauge!(
        "fleetsim_active_anomalies",
        "Sensors currently flagged with an active anomaly"
    ).unwrap();

    // ============================================================
    // Dissemination totals (from StatsSnapshot)
    // ============================================================

    pub static ref TICKS_TOTAL: Gauge = register_gauge!(
        "fleetsim_ticks_total",
        "Completed dissemination ticks"
    ).unwrap();

    pub static ref READINGS_TOTAL: Gauge = register_gauge!(
        "fleetsim_readings_total",
        "Readings synthesized by the loop"
    ).unwrap();

    pub static ref SINK_DELIVERED_TOTAL: Gauge = register_gauge!(
        "fleetsim_sink_delivered_total",
        "Readings acknowledged by the durable sink"
    ).unwrap();

    pub static ref SINK_FAILED_TOTAL: Gauge = register_gauge!(
        "fleetsim_sink_failed_total",
        "Readings dropped after a durable sink failure"
    ).unwrap();

    pub static ref SUBSCRIBER_DELIVERIES_TOTAL: Gauge = register_gauge!(
        "fleetsim_subscriber_deliveries_total",
        "Messages handed to live subscribers"
    ).unwrap();

    pub static ref SUBSCRIBERS_DROPPED_TOTAL: Gauge = register_gauge!(
        "fleetsim_subscribers_dropped_total",
        "Live subscribers removed after a failed push"
    ).unwrap();

    pub static ref ANOMALIES_INJECTED_TOTAL: Gauge = register_gauge!(
        "fleetsim_anomalies_injected_total",
        "Anomalies injected across all sensors"
    ).unwrap();

    // ============================================================
    // Server
    // ============================================================

    /// Open WebSocket subscribers.
    pub static ref LIVE_SUBSCRIBERS: Gauge = register_gauge!(
        "fleetsim_live_subscribers",
        "Currently registered live subscribers"
    ).unwrap();
}

/// Point-in-time view of the engine used to refresh the gauges.
#[derive(Debug, Clone, Copy)]
pub struct EngineSample {
    pub sensors: usize,
    pub frequency_hz: f64,
    pub loop_state: LoopState,
    pub active_anomalies: usize,
    pub live_subscribers: usize,
    pub stats: StatsSnapshot,
}

/// Copy an engine sample into the gauges.
pub fn update_engine_metrics(sample: &EngineSample) {
    SENSOR_COUNT.set(sample.sensors as f64);
    FREQUENCY_HZ.set(sample.frequency_hz);
    LOOP_RUNNING.set(if sample.loop_state == LoopState::Running {
        1.0
    } else {
        0.0
    });
    ACTIVE_ANOMALIES.set(sample.active_anomalies as f64);
    LIVE_SUBSCRIBERS.set(sample.live_subscribers as f64);

    let stats = &sample.stats;
    TICKS_TOTAL.set(stats.ticks as f64);
    READINGS_TOTAL.set(stats.readings_generated as f64);
    SINK_DELIVERED_TOTAL.set(stats.sink_delivered as f64);
    SINK_FAILED_TOTAL.set(stats.sink_failed as f64);
    SUBSCRIBER_DELIVERIES_TOTAL.set(stats.subscriber_deliveries as f64);
    SUBSCRIBERS_DROPPED_TOTAL.set(stats.subscribers_dropped as f64);
    ANOMALIES_INJECTED_TOTAL.set(stats.anomalies_injected as f64);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
