//! Render pipeline: owns the pixel buffer, the active mode, and drives mode
//! handlers once per tick.
//!
//! Grounded on `original_source/main/src/LedControl.c`'s main service loop
//! (`LedControl_Service`), which calls exactly one mode's draw function per
//! tick and flushes the strip only when a draw marked `flushNeeded`.
//! `spec.md` §4.13 fixes the tick period at 50 ms; callers drive that from
//! a real timer, this module only needs to be called with the current tick.

use crate::hal::Strip;
use crate::heartbeat::GameColor;
use crate::led::color::Rgb;
use crate::led::modes::{
    self, BatteryIndicator, BleTransferPercent, GameEventRenderer, RotationEngine, STRIP_LEN,
};
use crate::led::sequence::SequenceCursor;
use crate::time::Tick;
use crate::touch::{TouchState, NUM_ELECTRODES};

pub const RENDER_TICK_MS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LedMode {
    Off,
    Sequence,
    Touch,
    Song,
    InteractiveGame,
    GameEvent,
    BleFileTransferPercent,
    BleEnabled,
    BleConnected,
    BleReconnecting,
    OtaInProgress,
    NetworkTestResult,
    BatteryIndicator,
}

enum ModeState {
    Off,
    Sequence(Option<SequenceCursor>),
    Touch([TouchState; NUM_ELECTRODES]),
    Song { octave: u8 },
    InteractiveGame { bits: u16, last_failed: bool, color: Rgb },
    GameEvent(GameEventRenderer),
    BleFileTransferPercent { engine: BleTransferPercent, percent: u8 },
    Rotation(RotationEngine, Rgb),
    BatteryIndicator { engine: BatteryIndicator, percent: u8 },
}

pub struct RenderPipeline {
    pixels: Vec<Rgb>,
    mode: LedMode,
    state: ModeState,
    flush_needed: bool,
}

impl RenderPipeline {
    pub fn new() -> Self {
        Self {
            pixels: vec![Rgb::BLACK; STRIP_LEN],
            mode: LedMode::Off,
            state: ModeState::Off,
            flush_needed: false,
        }
    }

    pub fn current_mode(&self) -> LedMode {
        self.mode
    }

    pub fn set_off(&mut self) {
        self.mode = LedMode::Off;
        self.state = ModeState::Off;
        for p in self.pixels.iter_mut() {
            *p = Rgb::BLACK;
        }
        self.flush_needed = true;
    }

    pub fn set_sequence(&mut self, json: &[u8], now: Tick) {
        self.mode = LedMode::Sequence;
        self.state = ModeState::Sequence(SequenceCursor::from_json(json, now));
    }

    pub fn set_touch(&mut self) {
        self.mode = LedMode::Touch;
        self.state = ModeState::Touch([TouchState::Released; NUM_ELECTRODES]);
    }

    pub fn update_touch_state(&mut self, electrode: usize, new_state: TouchState) {
        if let ModeState::Touch(states) = &mut self.state {
            states[electrode] = new_state;
        }
    }

    pub fn set_song(&mut self, octave: u8) {
        self.mode = LedMode::Song;
        self.state = ModeState::Song { octave };
    }

    pub fn set_interactive_game(&mut self, bits: u16, last_failed: bool, random_color: Rgb) {
        self.mode = LedMode::InteractiveGame;
        self.state = ModeState::InteractiveGame {
            bits,
            last_failed,
            color: random_color,
        };
    }

    pub fn set_game_event(&mut self, now: Tick, color: GameColor) {
        self.mode = LedMode::GameEvent;
        self.state = ModeState::GameEvent(GameEventRenderer::new(now, color));
    }

    pub fn set_ble_file_transfer_percent(&mut self) {
        self.mode = LedMode::BleFileTransferPercent;
        self.state = ModeState::BleFileTransferPercent {
            engine: BleTransferPercent::default(),
            percent: 0,
        };
    }

    pub fn update_ble_file_transfer_percent(&mut self, percent: u8) {
        if let ModeState::BleFileTransferPercent { percent: p, .. } = &mut self.state {
            *p = percent;
        }
    }

    pub fn set_ble_enabled(&mut self, now: Tick) {
        self.mode = LedMode::BleEnabled;
        self.state = ModeState::Rotation(
            RotationEngine::new(now, modes::OUTER_RING_OFFSET, modes::OUTER_RING_COUNT, 3, 1.0),
            Rgb::BLUE,
        );
    }

    pub fn set_ble_connected(&mut self, now: Tick) {
        self.mode = LedMode::BleConnected;
        self.state = ModeState::Rotation(
            RotationEngine::new(now, modes::OUTER_RING_OFFSET, modes::OUTER_RING_COUNT, 3, 1.0),
            Rgb::GREEN,
        );
    }

    pub fn set_ble_reconnecting(&mut self, now: Tick) {
        self.mode = LedMode::BleReconnecting;
        self.state = ModeState::Rotation(
            RotationEngine::new(now, modes::OUTER_RING_OFFSET, modes::OUTER_RING_COUNT, 3, 2.0),
            Rgb::ORANGE,
        );
    }

    pub fn set_ota_in_progress(&mut self, now: Tick) {
        self.mode = LedMode::OtaInProgress;
        self.state = ModeState::Rotation(
            RotationEngine::new(now, modes::OUTER_RING_OFFSET, modes::OUTER_RING_COUNT, 3, 0.5),
            Rgb::PURPLE,
        );
    }

    /// Same rotation engine as the BLE/OTA indicators, colored green for a
    /// pass and red for a fail; held until the coordinator's network-test
    /// timeout fires.
    pub fn set_network_test_result(&mut self, now: Tick, passed: bool) {
        self.mode = LedMode::NetworkTestResult;
        self.state = ModeState::Rotation(
            RotationEngine::new(now, modes::OUTER_RING_OFFSET, modes::OUTER_RING_COUNT, 3, 1.0),
            if passed { Rgb::GREEN } else { Rgb::RED },
        );
    }

    pub fn set_battery_indicator(&mut self, now: Tick, percent: u8, hold_duration_ms: u32) {
        self.mode = LedMode::BatteryIndicator;
        self.state = ModeState::BatteryIndicator {
            engine: BatteryIndicator::new(now, hold_duration_ms),
            percent,
        };
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    /// Runs the current mode's handler for tick `now`; writes the pixel
    /// buffer out to `strip` iff the handler changed anything.
    pub fn tick(&mut self, now: Tick, strip: &mut dyn Strip) -> anyhow::Result<()> {
        let changed = match &mut self.state {
            ModeState::Off => false,
            ModeState::Sequence(cursor) => cursor
                .as_mut()
                .map(|c| c.tick(now, &mut self.pixels))
                .unwrap_or(false),
            ModeState::Touch(states) => {
                modes::render_touch(states, &mut self.pixels);
                true
            }
            ModeState::Song { octave } => {
                let color = modes::color_for_octave(*octave);
                for p in self.pixels.iter_mut() {
                    *p = color;
                }
                true
            }
            ModeState::InteractiveGame {
                bits,
                last_failed,
                color,
            } => {
                modes::render_interactive_game(*bits, *last_failed, *color, &mut self.pixels);
                true
            }
            ModeState::GameEvent(renderer) => renderer.tick(now, modes::MAX_EVENT_MS, &mut self.pixels),
            ModeState::BleFileTransferPercent { engine, percent } => {
                engine.render_if_changed(*percent, &mut self.pixels)
            }
            ModeState::Rotation(engine, color) => {
                engine.tick(now, Rgb::BLACK, *color, &mut self.pixels)
            }
            ModeState::BatteryIndicator { engine, percent } => {
                engine.render(now, *percent, &mut self.pixels)
            }
        };

        if changed {
            self.flush_needed = true;
        }

        if self.flush_needed {
            for (i, pixel) in self.pixels.iter().enumerate() {
                strip.set_pixel(i, pixel.r, pixel.g, pixel.b);
            }
            strip.flush()?;
            self.flush_needed = false;
        }

        Ok(())
    }
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeStrip {
        pixels: Vec<(u8, u8, u8)>,
        flush_count: u32,
    }

    impl FakeStrip {
        fn new(len: usize) -> Self {
            Self {
                pixels: vec![(0, 0, 0); len],
                flush_count: 0,
            }
        }
    }

    impl Strip for FakeStrip {
        fn len(&self) -> usize {
            self.pixels.len()
        }
        fn set_pixel(&mut self, index: usize, r: u8, g: u8, b: u8) {
            if index < self.pixels.len() {
                self.pixels[index] = (r, g, b);
            }
        }
        fn flush(&mut self) -> anyhow::Result<()> {
            self.flush_count += 1;
            Ok(())
        }
    }

    #[test]
    fn off_mode_flushes_once_then_stays_idle() {
        let mut pipeline = RenderPipeline::new();
        let mut strip = FakeStrip::new(STRIP_LEN);
        pipeline.set_off();
        pipeline.tick(0, &mut strip).unwrap();
        assert_eq!(strip.flush_count, 1);
        pipeline.tick(50, &mut strip).unwrap();
        assert_eq!(strip.flush_count, 1, "idle ticks must not re-flush");
    }

    #[test]
    fn touch_mode_flushes_every_tick_it_renders() {
        let mut pipeline = RenderPipeline::new();
        let mut strip = FakeStrip::new(STRIP_LEN);
        pipeline.set_touch();
        pipeline.tick(0, &mut strip).unwrap();
        assert_eq!(strip.flush_count, 1);
    }

    #[test]
    fn ble_transfer_percent_skips_flush_when_unchanged() {
        let mut pipeline = RenderPipeline::new();
        let mut strip = FakeStrip::new(STRIP_LEN);
        pipeline.set_ble_file_transfer_percent();
        pipeline.update_ble_file_transfer_percent(10);
        pipeline.tick(0, &mut strip).unwrap();
        assert_eq!(strip.flush_count, 1);
        pipeline.tick(50, &mut strip).unwrap();
        assert_eq!(strip.flush_count, 1);
        pipeline.update_ble_file_transfer_percent(20);
        pipeline.tick(100, &mut strip).unwrap();
        assert_eq!(strip.flush_count, 2);
    }
}
