// Fleetsim Server - HTTP and WebSocket front-end for the telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Fleetsim Server
//!
//! Runs the telemetry engine behind a small HTTP surface.
//!
//! ## Usage
//!
//! ```bash
//! # In-memory sink, configure later through POST /configure
//! fleetsim-server
//!
//! # Durable local log, 10 sensors at 2 Hz from the start
//! fleetsim-server --sink log --log-dir /var/lib/fleetsim --sensors 10 --frequency 2.0
//! ```
//!
//! ## Endpoints
//!
//! - `POST /configure` `{num_sensors, frequency_hz}`
//! - `POST /inject-anomaly` `{sensor_ids, anomaly_type}`
//! - `POST /maintenance` `{sensor_ids}`
//! - `GET /ws` live readings and state snapshots
//! - `GET /metrics`, `/health`, `/ready`, `/status`

mod api;
mod metrics;
mod ws;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use fleetsim::sink::memory::DEFAULT_RETENTION;
use fleetsim::{
    Broker, Engine, EngineConfig, LogBroker, MemoryBroker, SinkConfig, DEFAULT_PARTITIONS,
    DEFAULT_TOPIC,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use api::AppState;

/// Durable sink back-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// In-process partitioned log, bounded per partition and lost on exit
    Memory,
    /// One append-only file per partition
    Log,
}

/// Industrial sensor telemetry simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "FLEETSIM_PORT", default_value = "8000")]
    port: u16,

    /// Durable sink back-end
    #[arg(long, env = "FLEETSIM_SINK", value_enum, default_value = "memory")]
    sink: SinkKind,

    /// Records kept per partition (memory sink only)
    #[arg(long, env = "FLEETSIM_MEMORY_RETENTION", default_value_t = DEFAULT_RETENTION)]
    memory_retention: usize,

    /// Directory of the partition logs (log sink only)
    #[arg(long, env = "FLEETSIM_LOG_DIR", default_value = "fleetsim-data")]
    log_dir: PathBuf,

    /// Topic readings are published to
    #[arg(long, env = "FLEETSIM_TOPIC", default_value = DEFAULT_TOPIC)]
    topic: String,

    /// Partitions per topic
    #[arg(long, env = "FLEETSIM_PARTITIONS", default_value_t = DEFAULT_PARTITIONS)]
    partitions: u32,

    /// Sensors to configure at startup (none = wait for POST /configure)
    #[arg(long, env = "FLEETSIM_SENSORS")]
    sensors: Option<usize>,

    /// Tick frequency in hertz
    #[arg(short, long, env = "FLEETSIM_FREQUENCY", default_value = "1.0")]
    frequency: f64,

    /// Seed for reproducible runs
    #[arg(long, env = "FLEETSIM_SEED")]
    seed: Option<u64>,

    /// Seconds to wait for a sink acknowledgment
    #[arg(long, env = "FLEETSIM_SEND_TIMEOUT", default_value = "10")]
    send_timeout_secs: u64,

    /// Messages buffered per WebSocket subscriber before it is dropped
    #[arg(long, env = "FLEETSIM_QUEUE_DEPTH", default_value = "256")]
    queue_depth: usize,

    /// Reject anomaly kinds other than temperature_spike, vibration_fault and pressure_drop
    #[arg(long, env = "FLEETSIM_REJECT_UNKNOWN_ANOMALIES")]
    reject_unknown_anomalies: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            topic: self.topic.clone(),
            default_frequency_hz: self.frequency,
            seed: self.seed,
            reject_unknown_anomalies: self.reject_unknown_anomalies,
            sink: SinkConfig {
                partitions: self.partitions,
                send_timeout: Duration::from_secs(self.send_timeout_secs),
                ..SinkConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn broker(&self) -> Arc<dyn Broker> {
        match self.sink {
            SinkKind::Memory => Arc::new(MemoryBroker::with_retention(
                self.partitions,
                self.memory_retention,
            )),
            SinkKind::Log => Arc::new(LogBroker::new(&self.log_dir, self.partitions)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Fleetsim Server v{}", env!("CARGO_PKG_VERSION"));

    let engine = Engine::new(args.engine_config(), args.broker())
        .context("invalid engine configuration")?;
    let engine = Arc::new(engine);

    // The sink is load-bearing: refuse to serve without it
    engine
        .probe_sink()
        .await
        .context("durable sink is unreachable")?;

    if let Some(sensors) = args.sensors {
        let report = engine
            .reconcile(sensors, args.frequency)
            .await
            .context("initial configuration rejected")?;
        info!(
            "Configured {} sensors at {} Hz",
            report.sensor_count, report.frequency_hz
        );
    } else {
        info!("Waiting for POST /configure");
    }

    let state = Arc::new(AppState {
        engine,
        queue_depth: args.queue_depth,
        start_time: Instant::now(),
    });
    let app = api::router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting server on http://{}", addr);
    info!("Live readings: ws://{}/ws", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["fleetsim-server"]);
        assert_eq!(args.sink, SinkKind::Memory);
        assert_eq!(args.partitions, 3);
        assert_eq!(args.memory_retention, DEFAULT_RETENTION);

        let config = args.engine_config();
        assert_eq!(config.topic, "raw-sensor-data");
        assert_eq!(config.sink.send_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_sink_args() {
        let args = Args::parse_from([
            "fleetsim-server",
            "--sink",
            "log",
            "--log-dir",
            "/tmp/fleet",
            "--sensors",
            "4",
            "--reject-unknown-anomalies",
        ]);
        assert_eq!(args.sink, SinkKind::Log);
        assert_eq!(args.sensors, Some(4));
        assert!(args.engine_config().reject_unknown_anomalies);
        assert!(args.broker().describe().starts_with("log://"));
    }
}
