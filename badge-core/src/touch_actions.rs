//! Gesture recognition: combinational electrode-state patterns → commands.
//!
//! Grounded on `spec.md` §4.6 and `original_source/main/src/TouchActions.c`'s
//! `REACTOR_BADGE` pattern table (`ReportTouchActionCommands`). A pattern
//! names, per electrode, either a required state, a minimum state, or
//! "don't care"; the first matching row in the table wins.

use crate::touch::{TouchState, NUM_ELECTRODES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchCommand {
    Clear,
    EnableTouch,
    DisableTouch,
    NextLedSequence,
    PrevLedSequence,
    DisplayVoltageMeter,
    EnableBlePairing,
    DisableBlePairing,
    ToggleSynthMode,
    NetworkTest,
}

/// One electrode's requirement in a gesture pattern row.
#[derive(Debug, Clone, Copy)]
pub enum Req {
    Is(TouchState),
    Not(TouchState),
    /// `>=` comparison, for rows the original expresses as e.g.
    /// `touchSensorValue[i] >= TOUCH_SENSOR_EVENT_SHORT_PRESSED`.
    AtLeast(TouchState),
    Any,
}

pub struct PatternRow {
    pub requirements: [Req; NUM_ELECTRODES],
    pub command: TouchCommand,
}

fn matches(row: &PatternRow, states: &[TouchState; NUM_ELECTRODES]) -> bool {
    row.requirements
        .iter()
        .zip(states.iter())
        .all(|(req, state)| match req {
            Req::Is(expected) => expected == state,
            Req::Not(excluded) => excluded != state,
            Req::AtLeast(minimum) => state >= minimum,
            Req::Any => true,
        })
}

fn all_released(states: &[TouchState; NUM_ELECTRODES]) -> bool {
    states.iter().all(|s| *s == TouchState::Released)
}

/// `REACTOR_BADGE` gesture table, reproduced from
/// `original_source/main/src/TouchActions.c`'s `#elif defined(REACTOR_BADGE)`
/// branch of `ReportTouchActionCommands`. Electrode positions here are
/// logical array indices (`0..9`), in the same order as the original's
/// `TouchSensorIndex` enum: `12, 1, 2, 4, 5, 7, 8, 10, 11` o'clock.
pub fn reactor_pattern_table() -> Vec<PatternRow> {
    use Req::*;
    use TouchState::*;

    vec![
        // 12, 1, 2, 4, 5, 7, 8, 10, 11 o'clock, all released.
        PatternRow {
            requirements: [
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Released),
            ],
            command: TouchCommand::Clear,
        },
        // 2 and 8 o'clock short-pressed-or-longer, 4 and 10 o'clock
        // short-pressed-or-longer, the rest released.
        PatternRow {
            requirements: [
                Is(Released),
                Is(Released),
                AtLeast(ShortPressed),
                AtLeast(ShortPressed),
                Is(Released),
                Is(Released),
                AtLeast(ShortPressed),
                AtLeast(ShortPressed),
                Is(Released),
            ],
            command: TouchCommand::EnableTouch,
        },
        // 1 and 11 o'clock touched, the rest released.
        PatternRow {
            requirements: [
                Is(Released),
                Is(Touched),
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Touched),
            ],
            command: TouchCommand::DisplayVoltageMeter,
        },
        // 2 o'clock touched, 10 o'clock touched-or-longer, the rest released.
        PatternRow {
            requirements: [
                Is(Released),
                Is(Released),
                Is(Touched),
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Released),
                AtLeast(Touched),
                Is(Released),
            ],
            command: TouchCommand::NextLedSequence,
        },
        // 4 o'clock touched, 10 o'clock touched-or-longer, the rest released.
        PatternRow {
            requirements: [
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Touched),
                Is(Released),
                Is(Released),
                Is(Released),
                AtLeast(Touched),
                Is(Released),
            ],
            command: TouchCommand::PrevLedSequence,
        },
        // 2 o'clock touched, 8 o'clock touched-or-longer, the rest released.
        PatternRow {
            requirements: [
                Is(Released),
                Is(Released),
                Is(Touched),
                Is(Released),
                Is(Released),
                Is(Released),
                AtLeast(Touched),
                Is(Released),
                Is(Released),
            ],
            command: TouchCommand::EnableBlePairing,
        },
        // 4 o'clock touched, 8 o'clock touched-or-longer, the rest released.
        PatternRow {
            requirements: [
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Touched),
                Is(Released),
                Is(Released),
                AtLeast(Touched),
                Is(Released),
                Is(Released),
            ],
            command: TouchCommand::DisableBlePairing,
        },
        // 4, 5, 7 o'clock touched, 8 o'clock touched-or-longer, the rest
        // released.
        PatternRow {
            requirements: [
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Touched),
                Is(Touched),
                Is(Touched),
                AtLeast(Touched),
                Is(Released),
                Is(Released),
            ],
            command: TouchCommand::ToggleSynthMode,
        },
        // 5 and 7 o'clock touched, the rest released.
        PatternRow {
            requirements: [
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Released),
                Is(Touched),
                Is(Touched),
                Is(Released),
                Is(Released),
                Is(Released),
            ],
            command: TouchCommand::NetworkTest,
        },
    ]
}

/// Maintains last-seen classification per electrode and matches the
/// hardware variant's gesture table against it on every update.
pub struct GestureMatcher {
    states: [TouchState; NUM_ELECTRODES],
    table: Vec<PatternRow>,
    clear_required: bool,
}

impl GestureMatcher {
    pub fn new(table: Vec<PatternRow>) -> Self {
        Self {
            states: [TouchState::Released; NUM_ELECTRODES],
            table,
            clear_required: false,
        }
    }

    /// Applies one electrode classification update and returns the emitted
    /// command, if any. Enforces the clear-required invariant from
    /// `spec.md` §4.6: after any non-clear command fires, no further
    /// non-clear command can fire until an all-released state is observed.
    pub fn update(&mut self, electrode: usize, state: TouchState) -> Option<TouchCommand> {
        self.states[electrode] = state;

        if all_released(&self.states) {
            self.clear_required = false;
            return Some(TouchCommand::Clear);
        }

        if self.clear_required {
            return None;
        }

        let command = self
            .table
            .iter()
            .find(|row| matches(row, &self.states))
            .map(|row| row.command)?;

        self.clear_required = true;
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::touch::TouchState::*;

    #[test]
    fn two_and_ten_oclock_touched_yields_next_led_sequence() {
        let mut matcher = GestureMatcher::new(reactor_pattern_table());
        matcher.update(2, Touched);
        let command = matcher.update(7, Touched);
        assert_eq!(command, Some(TouchCommand::NextLedSequence));
    }

    #[test]
    fn clear_must_precede_next_non_clear_command() {
        let mut matcher = GestureMatcher::new(reactor_pattern_table());
        matcher.update(2, Touched);
        matcher.update(7, Touched);
        // still touched, should not refire while the pattern persists
        let repeat = matcher.update(7, Touched);
        assert_eq!(repeat, None);

        for i in 0..NUM_ELECTRODES {
            matcher.update(i, Released);
        }
        let command = matcher.update(0, Touched);
        assert_eq!(command, None, "one electrode touched alone doesn't match a row");
    }

    #[test]
    fn all_released_always_emits_clear() {
        let mut matcher = GestureMatcher::new(reactor_pattern_table());
        let command = matcher.update(0, Released);
        assert_eq!(command, Some(TouchCommand::Clear));
    }
}
