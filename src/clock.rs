// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Injectable time source.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Local, Offset, Timelike, Utc};
use std::sync::{Mutex, PoisonError};

/// Source of wall-clock time for the synthesizer and anomaly expiry.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Hour of day (0-23) of `at` in the clock's local time zone.
    fn local_hour(&self, at: DateTime<Utc>) -> u32;
}

/// Real time, local hours taken from the host time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_hour(&self, at: DateTime<Utc>) -> u32 {
        at.with_timezone(&Local).hour()
    }
}

/// Settable clock with a fixed UTC offset.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    /// Clock frozen at `start`, local time equal to UTC.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_offset(start, Utc.fix())
    }

    /// Clock frozen at `start` with local time at `offset`.
    pub fn with_offset(start: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(start),
            offset,
        }
    }

    /// Jump to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: std::time::Duration) {
        let by = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn local_hour(&self, at: DateTime<Utc>) -> u32 {
        at.with_timezone(&self.offset).hour()
    }
}

/// Seconds from `from` to `to` (negative if `to` is earlier).
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Wall-clock seconds since the Unix epoch.
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_micros()) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::from_secs(90));
        assert_eq!(seconds_between(start, clock.now()), 90.0);
    }

    #[test]
    fn test_manual_clock_local_hour_uses_offset() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap();
        let clock = ManualClock::with_offset(start, FixedOffset::east_opt(3 * 3600).unwrap());
        assert_eq!(clock.local_hour(clock.now()), 9);
    }

    #[test]
    fn test_epoch_seconds() {
        let at = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        assert_eq!(epoch_seconds(at), 1_700_000_000.25);
    }
}
