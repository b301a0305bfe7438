// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Anomaly overlay state machine.
//!
//! Every sensor carries one [`AnomalyState`], inactive until an anomaly is injected.
//! An injected anomaly stays active for a random duration and perturbs each reading
//! with an additive overlay scaled by its severity.
//!
//! ```text
//!            inject()
//!  Inactive ─────────► Active ──┐
//!     ▲                  │      │ inject() overwrites
//!     │  now - start     │ ◄────┘
//!     └── > duration ────┘
//! ```

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::clock::seconds_between;
use crate::error::{FleetError, Result};

/// Severity drawn at injection, inclusive bounds
pub const SEVERITY_RANGE: (f64, f64) = (0.5, 1.0);

/// Anomaly duration drawn at injection, whole seconds, inclusive bounds
pub const DURATION_SECS_RANGE: (u64, u64) = (10, 30);

/// Kind of injected anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnomalyKind {
    /// Temperature rises by 20 x severity.
    TemperatureSpike,
    /// Vibration rises by 1.5 x severity.
    VibrationFault,
    /// Pressure falls by 30 x severity.
    PressureDrop,
    /// Accepted but applies no overlay.
    Unrecognized(String),
}

impl AnomalyKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &str {
        match self {
            AnomalyKind::TemperatureSpike => "temperature_spike",
            AnomalyKind::VibrationFault => "vibration_fault",
            AnomalyKind::PressureDrop => "pressure_drop",
            AnomalyKind::Unrecognized(name) => name,
        }
    }

    /// Whether the kind is one of the enumerated overlays
    pub fn is_known(&self) -> bool {
        !matches!(self, AnomalyKind::Unrecognized(_))
    }

    /// Apply this kind's overlay to a set of channel levels
    pub fn apply(&self, severity: f64, levels: &mut Levels) {
        match self {
            AnomalyKind::TemperatureSpike => levels.temperature += 20.0 * severity,
            AnomalyKind::VibrationFault => levels.vibration += 1.5 * severity,
            AnomalyKind::PressureDrop => levels.pressure -= 30.0 * severity,
            AnomalyKind::Unrecognized(_) => {}
        }
    }
}

impl FromStr for AnomalyKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "temperature_spike" => AnomalyKind::TemperatureSpike,
            "vibration_fault" => AnomalyKind::VibrationFault,
            "pressure_drop" => AnomalyKind::PressureDrop,
            other => AnomalyKind::Unrecognized(other.to_string()),
        })
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AnomalyKind {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AnomalyKind {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(AnomalyKind::from_str(&name).unwrap_or_else(|never| match never {}))
    }
}

/// Temperature, vibration and pressure levels being assembled for one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
}

/// Overlay state of one sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalyState {
    /// Whether an anomaly is currently active
    pub active: bool,
    /// Kind of the last injected anomaly (kept after expiry)
    pub kind: Option<AnomalyKind>,
    /// Severity in [0, 1]
    pub severity: f64,
    /// How long the anomaly lasts once injected
    pub duration: Duration,
    /// Injection instant
    pub started_at: Option<DateTime<Utc>>,
}

impl AnomalyState {
    /// Activate with a freshly drawn severity and duration, replacing any prior anomaly.
    pub fn activate<R: Rng + ?Sized>(
        &mut self,
        kind: AnomalyKind,
        now: DateTime<Utc>,
        rng: &mut R,
    ) {
        let severity = rng.gen_range(SEVERITY_RANGE.0..=SEVERITY_RANGE.1);
        let secs = rng.gen_range(DURATION_SECS_RANGE.0..=DURATION_SECS_RANGE.1);
        *self = AnomalyState {
            active: true,
            kind: Some(kind),
            severity,
            duration: Duration::from_secs(secs),
            started_at: Some(now),
        };
    }

    /// Expire the anomaly if `now` is past its end; returns whether it is still active.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        let expired = match self.started_at {
            Some(start) => seconds_between(start, now) > self.duration.as_secs_f64(),
            None => true,
        };
        if expired {
            self.active = false;
        }
        self.active
    }

    /// Apply the overlay if active; call after [`AnomalyState::evaluate`].
    pub fn apply(&self, levels: &mut Levels) {
        if let (true, Some(kind)) = (self.active, &self.kind) {
            kind.apply(self.severity, levels);
        }
    }

    /// Snapshot view for subscribers
    pub fn summary(&self) -> SensorState {
        SensorState {
            anomaly_active: self.active,
            anomaly_type: self.kind.as_ref().map(|k| k.as_str().to_string()),
        }
    }
}

/// Per-sensor anomaly summary carried in state snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorState {
    pub anomaly_active: bool,
    pub anomaly_type: Option<String>,
}

/// Anomaly states keyed by sensor id.
#[derive(Debug, Default)]
pub struct AnomalyStateMachine {
    states: HashMap<String, AnomalyState>,
}

impl AnomalyStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `id` in the inactive state.
    pub(crate) fn track(&mut self, id: &str) {
        self.states.insert(id.to_string(), AnomalyState::default());
    }

    /// Stop tracking `id`.
    pub(crate) fn forget(&mut self, id: &str) -> Option<AnomalyState> {
        self.states.remove(id)
    }

    /// Activate an anomaly on a tracked sensor.
    pub fn inject<R: Rng + ?Sized>(
        &mut self,
        id: &str,
        kind: AnomalyKind,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<()> {
        let state = self
            .states
            .get_mut(id)
            .ok_or_else(|| FleetError::UnknownSensor(id.to_string()))?;
        state.activate(kind, now, rng);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&AnomalyState> {
        self.states.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut AnomalyState> {
        self.states.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.states.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Active flag and kind of every tracked sensor, ordered by id.
    pub fn snapshot(&self) -> BTreeMap<String, SensorState> {
        self.states
            .iter()
            .map(|(id, state)| (id.clone(), state.summary()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap()
    }

    fn levels() -> Levels {
        Levels {
            temperature: 70.0,
            vibration: 0.2,
            pressure: 100.0,
        }
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            "temperature_spike".parse::<AnomalyKind>().unwrap(),
            AnomalyKind::TemperatureSpike
        );
        assert_eq!(
            "pressure_drop".parse::<AnomalyKind>().unwrap(),
            AnomalyKind::PressureDrop
        );
        let other: AnomalyKind = "bearing_wear".parse().unwrap();
        assert!(!other.is_known());
        assert_eq!(other.as_str(), "bearing_wear");
    }

    #[test]
    fn test_activate_draws_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut state = AnomalyState::default();
            state.activate(AnomalyKind::VibrationFault, t0(), &mut rng);
            assert!(state.active);
            assert!((0.5..=1.0).contains(&state.severity));
            assert!((10..=30).contains(&state.duration.as_secs()));
            assert_eq!(state.started_at, Some(t0()));
        }
    }

    #[test]
    fn test_overlays() {
        let cases = [
            (AnomalyKind::TemperatureSpike, 90.0, 0.2, 100.0),
            (AnomalyKind::VibrationFault, 70.0, 1.7, 100.0),
            (AnomalyKind::PressureDrop, 70.0, 0.2, 70.0),
            (AnomalyKind::Unrecognized("x".into()), 70.0, 0.2, 100.0),
        ];
        for (kind, t, v, p) in cases {
            let mut l = levels();
            kind.apply(1.0, &mut l);
            approx::assert_relative_eq!(l.temperature, t);
            approx::assert_relative_eq!(l.vibration, v);
            approx::assert_relative_eq!(l.pressure, p);
        }
    }

    #[test]
    fn test_expiry_is_strict() {
        let mut state = AnomalyState {
            active: true,
            kind: Some(AnomalyKind::TemperatureSpike),
            severity: 0.5,
            duration: Duration::from_secs(10),
            started_at: Some(t0()),
        };

        // Exactly at the boundary the anomaly is still active
        assert!(state.evaluate(t0() + chrono::Duration::seconds(10)));

        assert!(!state.evaluate(t0() + chrono::Duration::milliseconds(10_001)));
        assert!(!state.active);
        // Kind is retained for the snapshot
        assert_eq!(state.kind, Some(AnomalyKind::TemperatureSpike));

        let mut l = levels();
        state.apply(&mut l);
        assert_eq!(l, levels());
    }

    #[test]
    fn test_inject_unknown_sensor() {
        let mut machine = AnomalyStateMachine::new();
        let mut rng = StdRng::seed_from_u64(1);
        let result = machine.inject("sensor_0", AnomalyKind::PressureDrop, t0(), &mut rng);
        assert!(matches!(result, Err(FleetError::UnknownSensor(_))));
        assert!(machine.is_empty());
    }

    #[test]
    fn test_inject_overwrites() {
        let mut machine = AnomalyStateMachine::new();
        let mut rng = StdRng::seed_from_u64(1);
        machine.track("sensor_0");
        machine
            .inject("sensor_0", AnomalyKind::PressureDrop, t0(), &mut rng)
            .unwrap();
        let later = t0() + chrono::Duration::seconds(5);
        machine
            .inject("sensor_0", AnomalyKind::VibrationFault, later, &mut rng)
            .unwrap();

        let state = machine.get("sensor_0").unwrap();
        assert_eq!(state.kind, Some(AnomalyKind::VibrationFault));
        assert_eq!(state.started_at, Some(later));
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut machine = AnomalyStateMachine::new();
        machine.track("sensor_1");
        let json = serde_json::to_value(machine.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"sensor_1": {"anomaly_active": false, "anomaly_type": null}})
        );
    }
}
