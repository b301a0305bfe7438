// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for Fleetsim

use std::time::Duration;

use crate::error::{FleetError, Result};
use crate::recovery::RetryStrategy;

/// Topic carrying raw readings
pub const DEFAULT_TOPIC: &str = "raw-sensor-data";

/// Partition count of the raw readings topic
pub const DEFAULT_PARTITIONS: u32 = 3;

/// Durable sink configuration
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Number of partitions readings are spread across
    pub partitions: u32,

    /// Delays between connection attempts
    pub retry: RetryStrategy,

    /// Upper bound on waiting for a broker acknowledgment
    pub send_timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
            // 3 attempts, sleeping 1s then 2s
            retry: RetryStrategy::exponential(2, Duration::from_secs(1)),
            send_timeout: Duration::from_secs(10),
        }
    }
}

impl SinkConfig {
    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(FleetError::InvalidConfig(
                "partition count must be at least 1".to_string(),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(FleetError::InvalidConfig(
                "send timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Engine-level configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Topic readings are published to
    pub topic: String,

    /// Frequency used until the first reconciliation sets one
    pub default_frequency_hz: f64,

    /// Seed for the engine's random source (None = entropy)
    pub seed: Option<u64>,

    /// Reject anomaly kinds outside the known set instead of accepting them as no-ops
    pub reject_unknown_anomalies: bool,

    /// Deadline for a single push to a live subscriber
    pub push_timeout: Duration,

    /// Durable sink settings
    pub sink: SinkConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            default_frequency_hz: 1.0,
            seed: None,
            reject_unknown_anomalies: false,
            push_timeout: Duration::from_secs(1),
            sink: SinkConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with a fixed random seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Default::default()
        }
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        validate_frequency(self.default_frequency_hz)?;
        if self.topic.is_empty() {
            return Err(FleetError::InvalidConfig("topic must not be empty".to_string()));
        }
        self.sink.validate()
    }
}

/// Frequencies must be finite and strictly positive
pub fn validate_frequency(frequency_hz: f64) -> Result<()> {
    if frequency_hz.is_finite() && frequency_hz > 0.0 {
        Ok(())
    } else {
        Err(FleetError::InvalidConfig(format!(
            "frequency must be a positive number of hertz, got {}",
            frequency_hz
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_config_default() {
        let config = SinkConfig::default();
        assert_eq!(config.partitions, 3);
        assert_eq!(config.send_timeout, Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.topic, "raw-sensor-data");
        assert_eq!(config.default_frequency_hz, 1.0);
        assert!(config.seed.is_none());
        assert!(!config.reject_unknown_anomalies);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_config_with_seed() {
        let config = EngineConfig::with_seed(42);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_zero_partitions_rejected() {
        let config = SinkConfig {
            partitions: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FleetError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_frequency() {
        assert!(validate_frequency(0.5).is_ok());
        assert!(validate_frequency(0.0).is_err());
        assert!(validate_frequency(-1.0).is_err());
        assert!(validate_frequency(f64::NAN).is_err());
        assert!(validate_frequency(f64::INFINITY).is_err());
    }
}
