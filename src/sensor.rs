// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor population management
//!
//! This module provides [`SensorConfig`] and the [`SensorRegistry`], which owns every
//! configured sensor together with its anomaly state. A sensor and its anomaly state
//! are always added and removed together.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::anomaly::{AnomalyKind, AnomalyState, AnomalyStateMachine, SensorState};
use crate::error::{FleetError, Result};
use crate::reading::{synthesize, Reading, SampleTime};

/// Static and slowly-changing parameters of one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Temperature baseline
    pub base_temperature: f64,
    /// Vibration baseline
    pub base_vibration: f64,
    /// Pressure baseline
    pub base_pressure: f64,
    /// Standard deviation of per-reading Gaussian jitter
    pub noise_level: f64,
    /// Linear degradation per elapsed second at full maintenance factor
    pub drift_rate: f64,
    /// Hours until maintenance is due
    pub maintenance_cycle_hours: u32,
    /// Last maintenance instant
    pub last_maintenance: DateTime<Utc>,
    /// Canonical test sensor (fixed baselines, no working-hours load)
    pub is_test: bool,
}

impl SensorConfig {
    /// Draw realistic baselines from the fleet's uniform ranges
    pub fn random<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> Self {
        Self {
            base_temperature: rng.gen_range(60.0..80.0),
            base_vibration: rng.gen_range(0.1..0.3),
            base_pressure: rng.gen_range(90.0..110.0),
            noise_level: rng.gen_range(0.02..0.05),
            drift_rate: rng.gen_range(0.001..0.003),
            maintenance_cycle_hours: rng.gen_range(120..=240),
            last_maintenance: now,
            is_test: false,
        }
    }

    /// Fixed parameters for verification sensors
    pub fn canonical(now: DateTime<Utc>) -> Self {
        Self {
            base_temperature: 70.0,
            base_vibration: 0.2,
            base_pressure: 100.0,
            noise_level: 0.01,
            drift_rate: 0.001,
            maintenance_cycle_hours: 168, // 1 week
            last_maintenance: now,
            is_test: true,
        }
    }
}

/// Registry of configured sensors and their anomaly states
#[derive(Debug, Default)]
pub struct SensorRegistry {
    configs: BTreeMap<String, SensorConfig>,
    anomalies: AnomalyStateMachine,
}

impl SensorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sensor with drawn (or canonical, for test sensors) parameters
    ///
    /// Returns false, leaving the existing sensor untouched, if `id` is already registered.
    pub fn add<R: Rng + ?Sized>(
        &mut self,
        id: &str,
        is_test: bool,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> bool {
        if self.configs.contains_key(id) {
            return false;
        }
        let config = if is_test {
            SensorConfig::canonical(now)
        } else {
            SensorConfig::random(rng, now)
        };
        self.insert(id, config);
        true
    }

    /// Register `id` with an explicit configuration, replacing any previous one
    pub fn insert(&mut self, id: &str, config: SensorConfig) {
        self.configs.insert(id.to_string(), config);
        self.anomalies.track(id);
    }

    /// Remove a sensor and its anomaly state; unknown ids are a no-op
    pub fn remove(&mut self, id: &str) -> Option<SensorConfig> {
        let removed = self.configs.remove(id);
        if removed.is_some() {
            self.anomalies.forget(id);
        }
        removed
    }

    /// Get a sensor's configuration
    pub fn get(&self, id: &str) -> Result<&SensorConfig> {
        self.configs
            .get(id)
            .ok_or_else(|| FleetError::UnknownSensor(id.to_string()))
    }

    /// Get a sensor's anomaly state
    pub fn anomaly(&self, id: &str) -> Result<&AnomalyState> {
        self.anomalies
            .get(id)
            .ok_or_else(|| FleetError::UnknownSensor(id.to_string()))
    }

    /// Check if a sensor is registered
    pub fn contains(&self, id: &str) -> bool {
        self.configs.contains_key(id)
    }

    /// Registered ids
    pub fn list(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }

    /// Iterate over registered ids
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    /// Number of registered sensors
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Check if no sensor is registered
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// First id in `ids` that is not registered
    pub fn first_unknown<'a>(&self, ids: &'a [String]) -> Option<&'a String> {
        ids.iter().find(|id| !self.contains(id))
    }

    /// Activate an anomaly on a registered sensor
    pub fn inject<R: Rng + ?Sized>(
        &mut self,
        id: &str,
        kind: AnomalyKind,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<()> {
        if !self.contains(id) {
            return Err(FleetError::UnknownSensor(id.to_string()));
        }
        self.anomalies.inject(id, kind, now, rng)
    }

    /// Reset a sensor's maintenance clock
    pub fn record_maintenance(&mut self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let config = self
            .configs
            .get_mut(id)
            .ok_or_else(|| FleetError::UnknownSensor(id.to_string()))?;
        config.last_maintenance = now;
        Ok(())
    }

    /// Synthesize one reading for `id`, updating its anomaly state
    pub fn generate<R: Rng + ?Sized>(
        &mut self,
        id: &str,
        at: &SampleTime,
        rng: &mut R,
    ) -> Result<Reading> {
        let config = self
            .configs
            .get(id)
            .ok_or_else(|| FleetError::UnknownSensor(id.to_string()))?;
        let anomaly = self
            .anomalies
            .get_mut(id)
            .ok_or_else(|| FleetError::UnknownSensor(id.to_string()))?;
        Ok(synthesize(id, config, anomaly, at, rng))
    }

    /// Synthesize one reading per registered sensor, in id order
    pub fn generate_all<R: Rng + ?Sized>(&mut self, at: &SampleTime, rng: &mut R) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(self.configs.len());
        for (id, config) in &self.configs {
            if let Some(anomaly) = self.anomalies.get_mut(id) {
                readings.push(synthesize(id, config, anomaly, at, rng));
            }
        }
        readings
    }

    /// Anomaly summary of every sensor
    pub fn states(&self) -> BTreeMap<String, SensorState> {
        self.anomalies.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap()
    }

    #[test]
    fn test_random_config_ranges() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let c = SensorConfig::random(&mut rng, now());
            assert!((60.0..80.0).contains(&c.base_temperature));
            assert!((0.1..0.3).contains(&c.base_vibration));
            assert!((90.0..110.0).contains(&c.base_pressure));
            assert!((0.02..0.05).contains(&c.noise_level));
            assert!((0.001..0.003).contains(&c.drift_rate));
            assert!((120..=240).contains(&c.maintenance_cycle_hours));
            assert!(!c.is_test);
        }
    }

    #[test]
    fn test_add_test_sensor_is_canonical() {
        let mut registry = SensorRegistry::new();
        let mut rng = StdRng::seed_from_u64(42);
        assert!(registry.add("test_sensor_0", true, &mut rng, now()));

        let config = registry.get("test_sensor_0").unwrap();
        assert_eq!(config, &SensorConfig::canonical(now()));
        assert!(!registry.anomaly("test_sensor_0").unwrap().active);
    }

    #[test]
    fn test_add_existing_is_untouched() {
        let mut registry = SensorRegistry::new();
        let mut rng = StdRng::seed_from_u64(42);
        registry.add("sensor_0", false, &mut rng, now());
        let before = registry.get("sensor_0").unwrap().clone();

        assert!(!registry.add("sensor_0", false, &mut rng, now()));
        assert_eq!(registry.get("sensor_0").unwrap(), &before);
    }

    #[test]
    fn test_remove_drops_both_entries() {
        let mut registry = SensorRegistry::new();
        let mut rng = StdRng::seed_from_u64(42);
        registry.add("sensor_0", false, &mut rng, now());

        assert!(registry.remove("sensor_0").is_some());
        assert!(matches!(
            registry.get("sensor_0"),
            Err(FleetError::UnknownSensor(_))
        ));
        assert!(registry.anomaly("sensor_0").is_err());
        assert!(registry.states().is_empty());

        // Unknown id is a no-op
        assert!(registry.remove("sensor_0").is_none());
    }

    #[test]
    fn test_generate_unknown_sensor() {
        let mut registry = SensorRegistry::new();
        let mut rng = StdRng::seed_from_u64(42);
        let at = SampleTime {
            process_start: now(),
            now: now(),
            local_hour: 2,
        };
        let result = registry.generate("ghost", &at, &mut rng);
        assert!(matches!(result, Err(FleetError::UnknownSensor(id)) if id == "ghost"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_generate_all_one_per_sensor() {
        let mut registry = SensorRegistry::new();
        let mut rng = StdRng::seed_from_u64(42);
        for i in 0..4 {
            registry.add(&format!("sensor_{}", i), false, &mut rng, now());
        }
        let at = SampleTime {
            process_start: now(),
            now: now(),
            local_hour: 2,
        };
        let readings = registry.generate_all(&at, &mut rng);
        assert_eq!(readings.len(), 4);
        assert_eq!(readings[0].sensor_id, "sensor_0");
        assert_eq!(readings[3].sensor_id, "sensor_3");
    }

    #[test]
    fn test_record_maintenance() {
        let mut registry = SensorRegistry::new();
        let mut rng = StdRng::seed_from_u64(42);
        registry.add("sensor_0", false, &mut rng, now());

        let later = now() + chrono::Duration::hours(200);
        registry.record_maintenance("sensor_0", later).unwrap();
        assert_eq!(registry.get("sensor_0").unwrap().last_maintenance, later);
        assert!(registry.record_maintenance("ghost", later).is_err());
    }
}
