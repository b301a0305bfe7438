// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Reading synthesis.
//!
//! A reading layers four independent effects over the sensor baselines:
//!
//! 1. Gaussian jitter with the sensor's noise level as standard deviation
//! 2. Linear drift, `drift_rate x elapsed x maintenance_factor` (doubled for vibration,
//!    negated for pressure)
//! 3. Working-hours load between 08:00 and 18:59 local time (non-test sensors only)
//! 4. The anomaly overlay, evaluated after expiry so an expired anomaly never
//!    perturbs the reading that discovers it

use chrono::{DateTime, Utc};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::anomaly::{AnomalyState, Levels};
use crate::clock::{epoch_seconds, seconds_between};
use crate::sensor::SensorConfig;

/// Maintenance factor above which a sensor reports `maintenance_needed`
pub const MAINTENANCE_THRESHOLD: f64 = 0.8;

/// Local hours (inclusive) during which working-hours load applies
pub const WORKING_HOURS: (u32, u32) = (8, 18);

/// Operational state reported with each reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalState {
    Normal,
    Anomaly,
}

/// One synthetic reading, as published to the durable sink and to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    /// Wall-clock seconds since the Unix epoch
    pub timestamp: f64,
    /// Two decimals
    pub temperature: f64,
    /// Three decimals
    pub vibration: f64,
    /// One decimal
    pub pressure: f64,
    pub operational_state: OperationalState,
    pub maintenance_needed: bool,
    pub is_test: bool,
}

impl Reading {
    pub fn is_anomalous(&self) -> bool {
        self.operational_state == OperationalState::Anomaly
    }
}

/// Time inputs of one synthesis.
#[derive(Debug, Clone, Copy)]
pub struct SampleTime {
    /// When the process (engine) started
    pub process_start: DateTime<Utc>,
    /// Instant of the reading
    pub now: DateTime<Utc>,
    /// Local hour of `now`
    pub local_hour: u32,
}

/// How overdue a sensor is for maintenance, clamped to [0, 1].
pub fn maintenance_factor(hours_since_maintenance: f64, maintenance_cycle_hours: u32) -> f64 {
    if maintenance_cycle_hours == 0 {
        return 1.0;
    }
    (hours_since_maintenance / f64::from(maintenance_cycle_hours)).clamp(0.0, 1.0)
}

/// Produce one reading, expiring `anomaly` as a side effect when its time is up.
pub fn synthesize<R: Rng + ?Sized>(
    sensor_id: &str,
    config: &SensorConfig,
    anomaly: &mut AnomalyState,
    at: &SampleTime,
    rng: &mut R,
) -> Reading {
    let elapsed = seconds_between(at.process_start, at.now);
    let hours_since_maintenance = seconds_between(config.last_maintenance, at.now) / 3600.0;
    let factor = maintenance_factor(hours_since_maintenance, config.maintenance_cycle_hours);
    let degradation = config.drift_rate * elapsed * factor;

    let mut levels = Levels {
        temperature: config.base_temperature + jitter(config.noise_level, rng) + degradation,
        vibration: config.base_vibration + jitter(config.noise_level, rng) + degradation * 2.0,
        pressure: config.base_pressure + jitter(config.noise_level, rng) - degradation,
    };

    if !config.is_test && (WORKING_HOURS.0..=WORKING_HOURS.1).contains(&at.local_hour) {
        levels.temperature += rng.gen_range(2.0..5.0);
        levels.vibration += rng.gen_range(0.05..0.1);
        levels.pressure += rng.gen_range(5.0..10.0);
    }

    let active = anomaly.evaluate(at.now);
    anomaly.apply(&mut levels);

    Reading {
        sensor_id: sensor_id.to_string(),
        timestamp: epoch_seconds(at.now),
        temperature: round_to(levels.temperature, 2),
        vibration: round_to(levels.vibration, 3),
        pressure: round_to(levels.pressure, 1),
        operational_state: if active {
            OperationalState::Anomaly
        } else {
            OperationalState::Normal
        },
        maintenance_needed: factor > MAINTENANCE_THRESHOLD,
        is_test: config.is_test,
    }
}

fn jitter<R: Rng + ?Sized>(std_dev: f64, rng: &mut R) -> f64 {
    match Normal::new(0.0, std_dev) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.0,
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyKind;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap()
    }

    fn quiet_config() -> SensorConfig {
        SensorConfig {
            noise_level: 0.0,
            ..SensorConfig::canonical(start())
        }
    }

    fn at(offset_secs: i64, local_hour: u32) -> SampleTime {
        SampleTime {
            process_start: start(),
            now: start() + chrono::Duration::seconds(offset_secs),
            local_hour,
        }
    }

    #[test]
    fn test_zero_degradation_returns_baselines() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut anomaly = AnomalyState::default();
        let reading = synthesize("test_sensor_0", &quiet_config(), &mut anomaly, &at(0, 2), &mut rng);

        assert_eq!(reading.temperature, 70.0);
        assert_eq!(reading.vibration, 0.2);
        assert_eq!(reading.pressure, 100.0);
        assert_eq!(reading.operational_state, OperationalState::Normal);
        assert!(!reading.maintenance_needed);
        assert!(reading.is_test);
    }

    #[test]
    fn test_maintenance_factor_monotonic_and_clamped() {
        let mut previous = 0.0;
        for step in 0..400 {
            let hours = step as f64;
            let factor = maintenance_factor(hours, 168);
            assert!(factor >= previous);
            assert!((0.0..=1.0).contains(&factor));
            previous = factor;
        }
        assert_eq!(maintenance_factor(168.0, 168), 1.0);
        assert_eq!(maintenance_factor(1000.0, 168), 1.0);
        assert_eq!(maintenance_factor(-5.0, 168), 0.0);
        assert_eq!(maintenance_factor(3.0, 0), 1.0);
    }

    #[test]
    fn test_drift_scales_with_overdue_maintenance() {
        let mut rng = StdRng::seed_from_u64(1);
        // Started long before maintenance was due: factor saturates at 1
        let config = SensorConfig {
            last_maintenance: start() - chrono::Duration::hours(400),
            ..quiet_config()
        };
        let mut anomaly = AnomalyState::default();
        let reading = synthesize("s", &config, &mut anomaly, &at(1000, 2), &mut rng);

        // drift 0.001/s x 1000s x 1.0
        assert_relative_eq!(reading.temperature, 71.0);
        assert_relative_eq!(reading.vibration, 2.2);
        assert_relative_eq!(reading.pressure, 99.0);
        assert!(reading.maintenance_needed);
    }

    #[test]
    fn test_working_hours_load_for_regular_sensors() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = SensorConfig {
            is_test: false,
            ..quiet_config()
        };
        let mut anomaly = AnomalyState::default();

        for hour in [8, 12, 18] {
            let r = synthesize("s", &config, &mut anomaly, &at(0, hour), &mut rng);
            assert!((72.0..=75.0).contains(&r.temperature), "{}", r.temperature);
            assert!((0.25..=0.3).contains(&r.vibration), "{}", r.vibration);
            assert!((105.0..=110.0).contains(&r.pressure), "{}", r.pressure);
        }
        for hour in [0, 7, 19, 23] {
            let r = synthesize("s", &config, &mut anomaly, &at(0, hour), &mut rng);
            assert_eq!(r.temperature, 70.0);
            assert!(!r.is_test);
        }
    }

    #[test]
    fn test_working_hours_skip_test_sensors() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut anomaly = AnomalyState::default();
        let r = synthesize("s", &quiet_config(), &mut anomaly, &at(0, 12), &mut rng);
        assert_eq!(r.temperature, 70.0);
    }

    #[test]
    fn test_anomaly_overlay_then_expiry() {
        let mut rng = StdRng::seed_from_u64(11);
        let config = quiet_config();
        let mut anomaly = AnomalyState::default();
        anomaly.activate(AnomalyKind::TemperatureSpike, start(), &mut rng);

        let during = synthesize("s", &config, &mut anomaly, &at(0, 2), &mut rng);
        assert!(during.is_anomalous());
        assert!(during.temperature >= 70.0 + 20.0 * 0.5);

        let after = anomaly.duration.as_secs() as i64 + 1;
        let r = synthesize("s", &config, &mut anomaly, &at(after, 2), &mut rng);
        assert_eq!(r.operational_state, OperationalState::Normal);
        assert!(r.temperature < 70.1);
        assert!(!anomaly.active);
    }

    #[test]
    fn test_pressure_drop_overlay() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut anomaly = AnomalyState {
            active: true,
            kind: Some(AnomalyKind::PressureDrop),
            severity: 0.5,
            duration: Duration::from_secs(20),
            started_at: Some(start()),
        };
        let r = synthesize("s", &quiet_config(), &mut anomaly, &at(5, 2), &mut rng);
        assert_eq!(r.pressure, 85.0);
        assert_eq!(r.temperature, 70.0);
    }

    #[test]
    fn test_output_precision() {
        assert_eq!(round_to(70.123_456, 2), 70.12);
        assert_eq!(round_to(0.123_456, 3), 0.123);
        assert_eq!(round_to(99.96, 1), 100.0);
    }

    #[test]
    fn test_reading_wire_format() {
        let reading = Reading {
            sensor_id: "sensor_0".to_string(),
            timestamp: 1.5,
            temperature: 70.0,
            vibration: 0.2,
            pressure: 100.0,
            operational_state: OperationalState::Anomaly,
            maintenance_needed: false,
            is_test: false,
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["operational_state"], "anomaly");
        assert_eq!(json["sensor_id"], "sensor_0");
        assert_eq!(json["maintenance_needed"], false);
    }
}
