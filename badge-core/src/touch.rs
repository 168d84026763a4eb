//! Per-electrode capacitive touch press detection and classification.
//!
//! Grounded on `spec.md` §4.5 and `original_source/main/src/TouchSensor.c`'s
//! `MonitorTouchSensors` delta-threshold press detector. Pure tick-driven
//! state machine: the firmware crate samples the real ADC every 100 ms and
//! calls [`TouchClassifier::sample`]; tests drive it with synthetic deltas.

use serde::{Deserialize, Serialize};

use crate::time::Tick;

pub const NUM_ELECTRODES: usize = 9;
pub const SAMPLE_PERIOD_MS: u32 = 100;
pub const PRESS_THRESHOLD: i32 = 150;

/// `DELTA_VALUE_HISTORY_SIZE`: window width for the recent-delta sum that
/// press detection thresholds against, rather than a single raw sample.
pub const DELTA_HISTORY_SIZE: usize = 1;

pub const SHORT_PRESS_MS: u32 = 1_000;
pub const LONG_PRESS_MS: u32 = 3_000;
pub const VERY_LONG_PRESS_MS: u32 = 5_000;
pub const ANTI_STICK_MS: u32 = 7_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TouchState {
    Released,
    Touched,
    ShortPressed,
    LongPressed,
    VeryLongPressed,
}

/// One electrode's press-detection and duration-classification state.
#[derive(Clone, Copy)]
struct Electrode {
    state: TouchState,
    touched_at: Tick,
    prev_raw: i32,
    delta_history: [i32; DELTA_HISTORY_SIZE],
    delta_ctr: usize,
}

impl Default for Electrode {
    fn default() -> Self {
        Self {
            state: TouchState::Released,
            touched_at: 0,
            prev_raw: 0,
            delta_history: [0; DELTA_HISTORY_SIZE],
            delta_ctr: 0,
        }
    }
}

pub struct TouchClassifier {
    electrodes: [Electrode; NUM_ELECTRODES],
    touch_globally_enabled: bool,
}

impl Default for TouchClassifier {
    fn default() -> Self {
        Self {
            electrodes: [Electrode::default(); NUM_ELECTRODES],
            touch_globally_enabled: true,
        }
    }
}

impl TouchClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_globally_enabled(&mut self, enabled: bool) {
        self.touch_globally_enabled = enabled;
    }

    pub fn state_of(&self, electrode: usize) -> TouchState {
        self.electrodes[electrode].state
    }

    /// Feeds one raw ADC sample for `electrode` at tick `now`. Returns
    /// `Some(new_state)` iff the classification changed, per `spec.md`
    /// §4.5 ("each classification transition emits one touch-sense event").
    pub fn sample(&mut self, electrode: usize, now: Tick, raw: i32) -> Option<TouchState> {
        let e = &mut self.electrodes[electrode];
        let delta = raw - e.prev_raw;
        e.prev_raw = raw;

        e.delta_history[e.delta_ctr] = delta;
        e.delta_ctr = (e.delta_ctr + 1) % DELTA_HISTORY_SIZE;
        let delta_sum: i32 = e.delta_history.iter().sum();
        let abs_delta_sum = delta_sum.abs();

        let previous = e.state;

        match e.state {
            TouchState::Released => {
                // negative delta means touch, mirroring the sign of the
                // latest sample even though the threshold looks at the
                // windowed sum.
                if abs_delta_sum > PRESS_THRESHOLD && delta < 0 {
                    e.state = TouchState::Touched;
                    e.touched_at = now;
                }
            }
            _ => {
                if abs_delta_sum > PRESS_THRESHOLD && delta >= 0 {
                    e.state = TouchState::Released;
                } else {
                    let held_ms = now.wrapping_sub(e.touched_at);
                    let mut classified = match e.state {
                        TouchState::Touched if held_ms >= SHORT_PRESS_MS => {
                            TouchState::ShortPressed
                        }
                        TouchState::ShortPressed if held_ms >= LONG_PRESS_MS => {
                            TouchState::LongPressed
                        }
                        TouchState::LongPressed if held_ms >= VERY_LONG_PRESS_MS => {
                            TouchState::VeryLongPressed
                        }
                        other => other,
                    };
                    if !self.touch_globally_enabled && held_ms >= ANTI_STICK_MS {
                        classified = TouchState::Released;
                    }
                    e.state = classified;
                }
            }
        }

        if e.state != previous {
            Some(e.state)
        } else {
            None
        }
    }
}

/// Remaps a logical electrode index to its physical LED/ADC channel index
/// for the given hardware variant. Variants with no published remap use the
/// identity permutation.
pub fn remap_electrode(variant_table: &[usize; NUM_ELECTRODES], logical_index: usize) -> usize {
    variant_table[logical_index]
}

pub const IDENTITY_ELECTRODE_MAP: [usize; NUM_ELECTRODES] = [0, 1, 2, 3, 4, 5, 6, 7, 8];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_delta_past_threshold_transitions_to_touched() {
        let mut c = TouchClassifier::new();
        let transition = c.sample(0, 0, -200);
        assert_eq!(transition, Some(TouchState::Touched));
    }

    #[test]
    fn positive_delta_past_threshold_releases() {
        let mut c = TouchClassifier::new();
        c.sample(0, 0, -200);
        let transition = c.sample(0, 100, 200);
        assert_eq!(transition, Some(TouchState::Released));
    }

    #[test]
    fn duration_classification_escalates_monotonically() {
        let mut c = TouchClassifier::new();
        c.sample(0, 0, -200);
        assert_eq!(c.sample(0, 1_000, 0), Some(TouchState::ShortPressed));
        assert_eq!(c.sample(0, 3_000, 0), Some(TouchState::LongPressed));
        assert_eq!(c.sample(0, 5_000, 0), Some(TouchState::VeryLongPressed));
    }

    #[test]
    fn long_pressed_never_reverts_to_short_pressed_without_release() {
        let mut c = TouchClassifier::new();
        c.sample(0, 0, -200);
        c.sample(0, 3_000, 0);
        assert_eq!(c.state_of(0), TouchState::LongPressed);
        // further small non-release deltas must not demote the state
        c.sample(0, 3_500, 5);
        assert_eq!(c.state_of(0), TouchState::LongPressed);
    }

    #[test]
    fn anti_stick_forces_release_when_globally_disabled() {
        let mut c = TouchClassifier::new();
        c.set_globally_enabled(false);
        c.sample(0, 0, -200);
        let transition = c.sample(0, 7_000, 0);
        assert_eq!(transition, Some(TouchState::Released));
    }

    #[test]
    fn electrodes_are_independent() {
        let mut c = TouchClassifier::new();
        c.sample(0, 0, -200);
        assert_eq!(c.state_of(1), TouchState::Released);
    }
}
