//! Battery sensor: sampled ADC voltage → percent, mutex-guarded.
//!
//! Grounded on `spec.md` §4.4 and `original_source/main/src/Battery.c`'s
//! averaging-then-calibration read path. The ADC driver itself is a
//! `firmware`-crate concern reached through [`crate::hal::BatteryMonitor`];
//! this module owns only the raw→percent conversion and the mutex-guarded
//! last-known-value cache, mirroring `firmware/src/board.rs`'s
//! I2C-polling-with-mutex pattern the way `DESIGN.md` grounds it.

use std::sync::{Mutex, TryLockError};
use std::time::Duration;

/// Number of raw ADC samples averaged per reading, per `spec.md` §4.4.
pub const SAMPLE_COUNT: usize = 64;
/// Sampling period of the battery task.
pub const SAMPLE_PERIOD_MS: u32 = 5_000;
/// Bounded wait for the percent-cache mutex before giving up.
pub const MUTEX_WAIT: Duration = Duration::from_millis(50);

/// Empty-battery reference voltage.
pub const VOLTAGE_MIN: f32 = 3.0;
/// Full-battery reference voltage.
pub const VOLTAGE_MAX: f32 = 4.18;

/// Sentinel returned by [`BatterySensor::percent`] when the cache's mutex
/// couldn't be acquired within [`MUTEX_WAIT`].
pub const UNAVAILABLE_PERCENT: i8 = -1;

/// Converts an averaged raw sample directly to millivolts. `firmware`'s ADC
/// calibration curve lives behind this function signature so `badge-core`
/// never touches `esp-idf-hal`'s `AdcDriver`/`AdcChannelDriver` types; tests
/// exercise [`voltage_to_percent`] directly instead of calibration.
pub fn average_raw(samples: &[u16]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    samples.iter().map(|&s| s as u32).sum::<u32>() / samples.len() as u32
}

/// Clamps `(v - VOLTAGE_MIN) / (VOLTAGE_MAX - VOLTAGE_MIN)` to `0..=1` and
/// scales to a percent, per `spec.md` §4.4.
pub fn voltage_to_percent(volts: f32) -> u8 {
    let fraction = (volts - VOLTAGE_MIN) / (VOLTAGE_MAX - VOLTAGE_MIN);
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Mutex-guarded last-known battery percent, refreshed by a periodic sample
/// task and read by every store's flush gate, the battery-indicator LED
/// mode, and the heartbeat stats snapshot.
#[derive(Default)]
pub struct BatterySensor {
    percent: Mutex<u8>,
}

impl BatterySensor {
    pub fn new() -> Self {
        Self {
            percent: Mutex::new(0),
        }
    }

    /// Records a freshly sampled percent, replacing the cached value.
    pub fn update(&self, percent: u8) {
        if let Ok(mut guard) = self.percent.lock() {
            *guard = percent;
        }
    }

    /// Returns the last sampled percent, or [`UNAVAILABLE_PERCENT`] if the
    /// mutex can't be acquired — `badge-core` has no real timed
    /// `try_lock_for`, so a non-blocking `try_lock` stands in for the
    /// bounded wait; the caller (a 50 ms-budget task) treats either outcome
    /// identically.
    pub fn percent(&self) -> i8 {
        match self.percent.try_lock() {
            Ok(guard) => *guard as i8,
            Err(TryLockError::WouldBlock) => UNAVAILABLE_PERCENT,
            Err(TryLockError::Poisoned(_)) => UNAVAILABLE_PERCENT,
        }
    }

    /// `true` iff the last sampled percent is at or above `threshold`,
    /// matching the battery-gated store flush rule in `spec.md` §4.3
    /// (strict `<` fails the flush, so `==` passes it).
    pub fn at_or_above(&self, threshold: u8) -> bool {
        let value = self.percent();
        value >= 0 && value as u8 >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_voltage_is_one_hundred_percent() {
        assert_eq!(voltage_to_percent(VOLTAGE_MAX), 100);
    }

    #[test]
    fn empty_voltage_is_zero_percent() {
        assert_eq!(voltage_to_percent(VOLTAGE_MIN), 0);
    }

    #[test]
    fn below_min_clamps_to_zero_not_negative() {
        assert_eq!(voltage_to_percent(2.5), 0);
    }

    #[test]
    fn above_max_clamps_to_one_hundred() {
        assert_eq!(voltage_to_percent(4.5), 100);
    }

    #[test]
    fn average_raw_divides_by_sample_count() {
        let samples = [100u16; SAMPLE_COUNT];
        assert_eq!(average_raw(&samples), 100);
    }

    #[test]
    fn average_raw_of_empty_slice_is_zero() {
        assert_eq!(average_raw(&[]), 0);
    }

    #[test]
    fn sensor_returns_last_updated_percent() {
        let sensor = BatterySensor::new();
        sensor.update(42);
        assert_eq!(sensor.percent(), 42);
    }

    #[test]
    fn threshold_boundary_is_strict_less_than_fails_not_equal() {
        // spec.md §8: "battery_percent == 10 ⇒ flush is allowed (threshold
        // is strict less-than)".
        let sensor = BatterySensor::new();
        sensor.update(10);
        assert!(sensor.at_or_above(10));
        sensor.update(9);
        assert!(!sensor.at_or_above(10));
    }
}
