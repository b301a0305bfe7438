// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Population reconciliation.
//!
//! The desired population for a count `n` is always `sensor_0 .. sensor_{n-1}`.
//! A [`ReconcilePlan`] lists what must change to get there from the current set;
//! applying the same count twice yields an empty plan the second time.

use serde::Serialize;
use std::collections::BTreeSet;

/// Id of the `index`-th sensor of the fleet
pub fn sensor_id(index: usize) -> String {
    format!("sensor_{}", index)
}

/// Ids that make up a population of `count` sensors
pub fn desired_ids(count: usize) -> BTreeSet<String> {
    (0..count).map(sensor_id).collect()
}

/// Additions and removals needed to reach a desired population
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl ReconcilePlan {
    /// Compare the current ids with the population of `desired_count`
    pub fn compute<'a>(current: impl IntoIterator<Item = &'a str>, desired_count: usize) -> Self {
        let desired = desired_ids(desired_count);
        let current: BTreeSet<&str> = current.into_iter().collect();

        let to_remove = current
            .iter()
            .filter(|id| !desired.contains(**id))
            .map(|id| id.to_string())
            .collect();
        let to_add = desired
            .iter()
            .filter(|id| !current.contains(id.as_str()))
            .cloned()
            .collect();

        Self { to_add, to_remove }
    }

    /// Check if the plan changes nothing
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Outcome of one reconciliation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub sensor_count: usize,
    pub frequency_hz: f64,
    /// Whether this call started the dissemination loop
    pub loop_started: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_empty() {
        let plan = ReconcilePlan::compute(Vec::<&str>::new(), 3);
        assert_eq!(plan.to_add, vec!["sensor_0", "sensor_1", "sensor_2"]);
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn test_plan_is_idempotent() {
        let current = ["sensor_0", "sensor_1"];
        assert!(ReconcilePlan::compute(current, 2).is_empty());
    }

    #[test]
    fn test_plan_shrinks_and_drops_strangers() {
        let current = ["sensor_0", "sensor_1", "sensor_2", "test_sensor_0"];
        let plan = ReconcilePlan::compute(current, 1);
        assert!(plan.to_add.is_empty());
        assert_eq!(plan.to_remove, vec!["sensor_1", "sensor_2", "test_sensor_0"]);
    }

    #[test]
    fn test_plan_zero_removes_everything() {
        let plan = ReconcilePlan::compute(["sensor_0"], 0);
        assert_eq!(plan.to_remove, vec!["sensor_0"]);
        assert!(plan.to_add.is_empty());
    }
}
