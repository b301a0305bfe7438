// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Telemetry engine
//!
//! The [`Engine`] owns the sensor registry, the durable sink, the live subscribers and
//! the lifecycle of the dissemination loop. Every external operation (reconcile,
//! inject, maintenance) goes through it.
//!
//! # Tick
//!
//! ```text
//! lock fleet ─► synthesize one reading per sensor ─► snapshot states ─► unlock
//!   for each reading:
//!       sink.send(topic, reading, sensor_id)    (bounded by the send timeout)
//!       subscribers.broadcast(sensor_reading)
//!   subscribers.broadcast(sensor_states)
//! sleep(1 / frequency)
//! ```
//!
//! The fleet lock is never held across a suspension point, so reconciliation and
//! injection can run concurrently with an in-progress tick. A sink or subscriber
//! failure is counted and logged but never aborts the tick.
//!
//! # Example
//!
//! ```rust,no_run
//! use fleetsim::{Engine, EngineConfig, MemoryBroker};
//! use std::sync::Arc;
//!
//! # async fn demo() -> fleetsim::Result<()> {
//! let broker = Arc::new(MemoryBroker::default());
//! let engine = Arc::new(Engine::new(EngineConfig::default(), broker)?);
//! engine.probe_sink().await?;
//! let report = engine.reconcile(5, 2.0).await?;
//! assert!(report.loop_started);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::anomaly::{AnomalyKind, AnomalyState, SensorState};
use crate::clock::{Clock, SystemClock};
use crate::config::{validate_frequency, EngineConfig};
use crate::error::{FleetError, Result};
use crate::metrics::{StatsSnapshot, TelemetryStats};
use crate::reading::{synthesize, Reading, SampleTime};
use crate::reconcile::{ReconcilePlan, ReconcileReport};
use crate::sensor::{SensorConfig, SensorRegistry};
use crate::sink::{Ack, Broker, DurableSink};
use crate::subscriber::{Broadcast, Subscriber, SubscriberHandle, SubscriberRegistry};

/// Id of the canonical reading sent by [`Engine::probe_sink`]
pub const PROBE_SENSOR_ID: &str = "test_sensor_0";

/// Lifecycle of the dissemination loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    NotStarted,
    /// Runs until the process exits
    Running,
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub readings: usize,
    pub sink_delivered: usize,
    pub sink_failed: usize,
    pub subscriber_deliveries: usize,
    pub subscribers_dropped: usize,
}

/// State guarded by the fleet lock
#[derive(Debug)]
struct Fleet {
    registry: SensorRegistry,
    rng: StdRng,
}

/// Telemetry synthesis and dissemination engine
pub struct Engine {
    config: EngineConfig,
    fleet: Mutex<Fleet>,
    sink: DurableSink,
    subscribers: SubscriberRegistry,
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
    /// f64 bits of the current frequency
    frequency_bits: AtomicU64,
    loop_started: AtomicBool,
    stats: TelemetryStats,
}

impl Engine {
    /// Create an engine on the system clock
    pub fn new(config: EngineConfig, broker: Arc<dyn Broker>) -> Result<Self> {
        Self::with_clock(config, broker, Arc::new(SystemClock))
    }

    /// Create an engine with an injected time source
    pub fn with_clock(
        config: EngineConfig,
        broker: Arc<dyn Broker>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let started_at = clock.now();

        Ok(Self {
            fleet: Mutex::new(Fleet {
                registry: SensorRegistry::new(),
                rng,
            }),
            sink: DurableSink::new(broker, config.sink.clone()),
            subscribers: SubscriberRegistry::new(config.push_timeout),
            clock,
            started_at,
            frequency_bits: AtomicU64::new(config.default_frequency_hz.to_bits()),
            loop_started: AtomicBool::new(false),
            stats: TelemetryStats::new(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sink(&self) -> &DurableSink {
        &self.sink
    }

    /// When the engine was created; the origin of drift
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Current tick frequency in hertz
    pub fn frequency(&self) -> f64 {
        f64::from_bits(self.frequency_bits.load(Ordering::Acquire))
    }

    pub fn loop_state(&self) -> LoopState {
        if self.loop_started.load(Ordering::Acquire) {
            LoopState::Running
        } else {
            LoopState::NotStarted
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn sample_time(&self) -> SampleTime {
        let now = self.clock.now();
        SampleTime {
            process_start: self.started_at,
            now,
            local_hour: self.clock.local_hour(now),
        }
    }

    /// Connect the durable sink and publish one canonical test reading to partition 0
    ///
    /// Fails with a connection error once the retry budget is exhausted.
    pub async fn probe_sink(&self) -> Result<Ack> {
        self.sink.connect().await?;

        let at = self.sample_time();
        let config = SensorConfig::canonical(at.now);
        let mut anomaly = AnomalyState::default();
        let reading = {
            let mut fleet = self.fleet.lock().await;
            synthesize(PROBE_SENSOR_ID, &config, &mut anomaly, &at, &mut fleet.rng)
        };

        let ack = self
            .sink
            .send_to(&self.config.topic, &reading, PROBE_SENSOR_ID, 0)
            .await?;
        info!(
            topic = %ack.topic,
            partition = ack.partition,
            offset = ack.offset,
            "Durable sink probe acknowledged"
        );
        Ok(ack)
    }

    /// Bring the population to `sensor_0 .. sensor_{count-1}` and set the frequency
    ///
    /// Does not start the dissemination loop; see [`Engine::reconcile`].
    pub async fn apply_population(
        &self,
        count: usize,
        frequency_hz: f64,
    ) -> Result<ReconcileReport> {
        validate_frequency(frequency_hz)?;

        let (plan, sensor_count) = {
            let mut fleet = self.fleet.lock().await;
            let plan = ReconcilePlan::compute(fleet.registry.ids(), count);
            let now = self.clock.now();
            let Fleet { registry, rng } = &mut *fleet;
            for id in &plan.to_remove {
                registry.remove(id);
            }
            for id in &plan.to_add {
                registry.add(id, false, rng, now);
            }
            (plan, registry.len())
        };
        self.frequency_bits
            .store(frequency_hz.to_bits(), Ordering::Release);

        if plan.is_empty() {
            debug!(sensor_count, frequency_hz, "Population already reconciled");
        } else {
            info!(
                added = plan.to_add.len(),
                removed = plan.to_remove.len(),
                sensor_count,
                frequency_hz,
                "Population reconciled"
            );
        }

        Ok(ReconcileReport {
            added: plan.to_add,
            removed: plan.to_remove,
            sensor_count,
            frequency_hz,
            loop_started: false,
        })
    }

    /// Reconcile the population and make sure the dissemination loop is running
    ///
    /// Idempotent: repeating a call with the same arguments changes nothing, and the
    /// loop is spawned by the first successful call only.
    pub async fn reconcile(
        self: &Arc<Self>,
        count: usize,
        frequency_hz: f64,
    ) -> Result<ReconcileReport> {
        let mut report = self.apply_population(count, frequency_hz).await?;
        report.loop_started = self.start_loop();
        Ok(report)
    }

    /// Spawn the dissemination loop unless it already runs; returns true if spawned
    pub fn start_loop(self: &Arc<Self>) -> bool {
        if self
            .loop_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        tokio::spawn(Arc::clone(self).run());
        true
    }

    async fn run(self: Arc<Self>) {
        info!(topic = %self.config.topic, "Dissemination loop started");
        loop {
            // Frequency changes apply at tick boundaries only
            let period =
                Duration::try_from_secs_f64(1.0 / self.frequency()).unwrap_or(Duration::MAX);
            let report = self.tick().await;
            debug!(
                readings = report.readings,
                sink_failed = report.sink_failed,
                subscribers_dropped = report.subscribers_dropped,
                "Tick complete"
            );
            sleep(period).await;
        }
    }

    /// Run one tick: synthesize, publish, broadcast readings, then broadcast states
    pub async fn tick(&self) -> TickReport {
        let (readings, states) = {
            let mut fleet = self.fleet.lock().await;
            let at = self.sample_time();
            let Fleet { registry, rng } = &mut *fleet;
            (registry.generate_all(&at, rng), registry.states())
        };

        let mut report = TickReport {
            readings: readings.len(),
            ..Default::default()
        };
        self.stats.record_tick(readings.len());

        for reading in readings {
            let delivered = match self
                .sink
                .send(&self.config.topic, &reading, &reading.sensor_id)
                .await
            {
                Ok(_) => {
                    report.sink_delivered += 1;
                    true
                }
                Err(e) => {
                    warn!(sensor = %reading.sensor_id, "Reading dropped by durable sink: {}", e);
                    report.sink_failed += 1;
                    false
                }
            };
            self.stats.record_sink(delivered);

            let fanout = self.subscribers.broadcast(Broadcast::SensorReading(reading)).await;
            report.subscriber_deliveries += fanout.delivered;
            report.subscribers_dropped += fanout.dropped;
            self.stats.record_broadcast(fanout.delivered, fanout.dropped);
        }

        let fanout = self.subscribers.broadcast(Broadcast::SensorStates(states)).await;
        report.subscriber_deliveries += fanout.delivered;
        report.subscribers_dropped += fanout.dropped;
        self.stats.record_broadcast(fanout.delivered, fanout.dropped);

        report
    }

    /// Activate `anomaly_type` on every listed sensor
    ///
    /// All-or-nothing: if any id is unknown, nothing is injected.
    pub async fn inject_anomaly(&self, sensor_ids: &[String], anomaly_type: &str) -> Result<()> {
        let kind = AnomalyKind::from_str(anomaly_type).unwrap_or_else(|never| match never {});
        if !kind.is_known() {
            if self.config.reject_unknown_anomalies {
                return Err(FleetError::UnknownAnomalyKind(anomaly_type.to_string()));
            }
            warn!(kind = %kind, "Unrecognized anomaly kind, no overlay will apply");
        }

        let mut fleet = self.fleet.lock().await;
        if let Some(id) = fleet.registry.first_unknown(sensor_ids) {
            return Err(FleetError::UnknownSensor(id.clone()));
        }
        let now = self.clock.now();
        let Fleet { registry, rng } = &mut *fleet;
        for id in sensor_ids {
            registry.inject(id, kind.clone(), now, rng)?;
        }
        drop(fleet);

        self.stats.record_injections(sensor_ids.len());
        info!(kind = %kind, sensors = ?sensor_ids, "Anomaly injected");
        Ok(())
    }

    /// Reset the maintenance clock of every listed sensor; all-or-nothing
    pub async fn record_maintenance(&self, sensor_ids: &[String]) -> Result<()> {
        let mut fleet = self.fleet.lock().await;
        if let Some(id) = fleet.registry.first_unknown(sensor_ids) {
            return Err(FleetError::UnknownSensor(id.clone()));
        }
        let now = self.clock.now();
        for id in sensor_ids {
            fleet.registry.record_maintenance(id, now)?;
        }
        info!(sensors = ?sensor_ids, "Maintenance recorded");
        Ok(())
    }

    /// Synthesize one reading for `id` outside the loop
    ///
    /// Updates the sensor's anomaly state like a tick would, but publishes nothing.
    pub async fn generate_reading(&self, id: &str) -> Result<Reading> {
        let mut fleet = self.fleet.lock().await;
        let at = self.sample_time();
        let Fleet { registry, rng } = &mut *fleet;
        registry.generate(id, &at, rng)
    }

    /// Configuration of one sensor
    pub async fn sensor_config(&self, id: &str) -> Result<SensorConfig> {
        self.fleet.lock().await.registry.get(id).cloned()
    }

    pub async fn sensor_ids(&self) -> Vec<String> {
        self.fleet.lock().await.registry.list()
    }

    pub async fn sensor_count(&self) -> usize {
        self.fleet.lock().await.registry.len()
    }

    /// Anomaly summary of every sensor
    pub async fn sensor_states(&self) -> BTreeMap<String, SensorState> {
        self.fleet.lock().await.registry.states()
    }

    /// Register a live subscriber
    pub async fn register_subscriber(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberHandle {
        self.subscribers.register(subscriber).await
    }

    /// Register a queue-backed live subscriber
    pub async fn subscribe(
        &self,
        capacity: usize,
    ) -> (SubscriberHandle, mpsc::Receiver<Arc<Broadcast>>) {
        self.subscribers.subscribe_channel(capacity).await
    }

    pub async fn unsubscribe(&self, handle: SubscriberHandle) -> bool {
        self.subscribers.unregister(handle).await
    }

    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("frequency", &self.frequency())
            .field("loop_state", &self.loop_state())
            .field("sink", &self.sink)
            .finish()
    }
}
