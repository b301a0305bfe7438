// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Fleetsim - Industrial sensor telemetry simulator
//!
//! Simulates a fleet of industrial sensors and disseminates synthetic telemetry, at a
//! configurable rate, to a durable ordered sink and to any number of live subscribers.
//!
//! ## Key Features
//!
//! - **Degradation model**: Gaussian noise, maintenance-gated drift, working-hours load
//! - **Anomaly overlays**: Temperature spikes, vibration faults and pressure drops that expire on their own
//! - **Durable delivery**: Partitioned by sensor id, acknowledged, with connect retry and backoff
//! - **Best-effort fan-out**: Slow or broken subscribers are dropped, never waited on
//!
//! ## Quick Start
//!
//! ```rust
//! use fleetsim::{Engine, EngineConfig, MemoryBroker, DEFAULT_TOPIC};
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let broker = MemoryBroker::default();
//! let engine = Engine::new(EngineConfig::with_seed(7), Arc::new(broker.clone())).unwrap();
//!
//! // Three sensors, no background loop
//! engine.apply_population(3, 1.0).await.unwrap();
//! let (_handle, live) = engine.subscribe(16).await;
//!
//! let report = engine.tick().await;
//! assert_eq!(report.readings, 3);
//! assert_eq!(broker.len(DEFAULT_TOPIC), 3);
//! assert_eq!(live.len(), 4); // three readings + one state snapshot
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`sensor`]: Sensor configurations and the registry
//! - [`anomaly`]: Anomaly kinds and the per-sensor state machine
//! - [`reading`]: Reading synthesis
//! - [`sink`]: Durable sink adapter and brokers
//! - [`subscriber`]: Live subscriber registry and broadcast
//! - [`reconcile`]: Population planning
//! - [`engine`]: The engine and its dissemination loop
//! - [`metrics`]: Dissemination statistics

// Modules
pub mod anomaly;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod reading;
pub mod reconcile;
pub mod recovery;
pub mod sensor;
pub mod sink;
pub mod subscriber;

// Re-exports for convenient access
pub use anomaly::{AnomalyKind, AnomalyState, AnomalyStateMachine, SensorState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, SinkConfig, DEFAULT_PARTITIONS, DEFAULT_TOPIC};
pub use engine::{Engine, LoopState, TickReport, PROBE_SENSOR_ID};
pub use error::{FleetError, PushError, Result, SinkError};
pub use metrics::{StatsSnapshot, TelemetryStats};
pub use reading::{OperationalState, Reading};
pub use reconcile::{ReconcilePlan, ReconcileReport};
pub use recovery::RetryStrategy;
pub use sensor::{SensorConfig, SensorRegistry};
pub use sink::log::LogBroker;
pub use sink::memory::MemoryBroker;
pub use sink::{partition_for, Ack, Broker, DurableSink, Producer, Record};
pub use subscriber::{
    Broadcast, BroadcastReport, ChannelSubscriber, Subscriber, SubscriberHandle,
    SubscriberRegistry,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
