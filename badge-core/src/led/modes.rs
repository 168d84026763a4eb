//! LED mode handlers: the overlay renderers other than the JSON sequence
//! player.
//!
//! Grounded on `original_source/main/src/LedControl.c`'s
//! `LedControl_DrawBatteryIndicator` / `..._DrawStatusIndicator` /
//! `..._DrawGameEvent` / interactive-game and touch color mapping. Ring
//! geometry (inner/outer offsets and counts) matches the "Reactor" hardware
//! variant's `#define`s, the same variant the touch gesture table in
//! [`crate::touch_actions`] is grounded on.

use crate::heartbeat::GameColor;
use crate::led::color::Rgb;
use crate::time::Tick;
use crate::touch::{TouchState, NUM_ELECTRODES};

pub const STRIP_LEN: usize = 48;
pub const INNER_RING_OFFSET: usize = 0;
pub const INNER_RING_COUNT: usize = 24;
pub const OUTER_RING_OFFSET: usize = 24;
pub const OUTER_RING_COUNT: usize = 24;

pub const MAX_EVENT_MS: u32 = 30 * 60_000;

fn game_color_to_rgb(color: GameColor) -> Rgb {
    match color {
        GameColor::Red => Rgb::RED,
        GameColor::Yellow => Rgb::YELLOW,
        GameColor::Green => Rgb::GREEN,
        GameColor::Cyan => Rgb::CYAN,
        GameColor::Blue => Rgb::BLUE,
        GameColor::Magenta => Rgb::MAGENTA,
    }
}

/// Fills a contiguous window of `count` pixels starting at `offset` with
/// `color`, leaving the rest of that window untouched — used by every ring
/// handler below.
fn fill_window(pixels: &mut [Rgb], offset: usize, count: usize, color: Rgb) {
    for p in pixels.iter_mut().skip(offset).take(count) {
        *p = color;
    }
}

/// Battery charge level fills both rings incrementally over a fixed hold
/// duration. Color band matches `spec.md` §4.13.
pub struct BatteryIndicator {
    hold_duration_ms: u32,
    started_at: Tick,
}

impl BatteryIndicator {
    pub fn new(now: Tick, hold_duration_ms: u32) -> Self {
        Self {
            hold_duration_ms,
            started_at: now,
        }
    }

    pub fn color_for_percent(percent: u8) -> Rgb {
        match percent {
            90..=255 => Rgb::BLUE,
            50..=89 => Rgb::GREEN,
            25..=49 => Rgb::ORANGE,
            _ => Rgb::RED,
        }
    }

    /// Renders progress as of `now`; returns `true` once fully filled (the
    /// caller can then return to the prior mode).
    pub fn render(&self, now: Tick, percent: u8, pixels: &mut [Rgb]) -> bool {
        let elapsed = now.wrapping_sub(self.started_at).min(self.hold_duration_ms);
        let fraction = if self.hold_duration_ms == 0 {
            1.0
        } else {
            elapsed as f64 / self.hold_duration_ms as f64
        };
        let color = Self::color_for_percent(percent);
        let outer_n = ((OUTER_RING_COUNT as f64 * fraction) as usize).max(1);
        let inner_n = ((INNER_RING_COUNT as f64 * fraction) as usize).max(1);
        fill_window(pixels, OUTER_RING_OFFSET, outer_n.min(OUTER_RING_COUNT), color);
        fill_window(pixels, INNER_RING_OFFSET, inner_n.min(INNER_RING_COUNT), color);
        fraction >= 1.0
    }
}

/// BLE file-transfer progress proportional fill, refreshed only when the
/// reported percent changes.
#[derive(Default)]
pub struct BleTransferPercent {
    last_rendered_percent: Option<u8>,
}

impl BleTransferPercent {
    pub fn render_if_changed(&mut self, percent: u8, pixels: &mut [Rgb]) -> bool {
        if self.last_rendered_percent == Some(percent) {
            return false;
        }
        self.last_rendered_percent = Some(percent);

        let outer_n = ((OUTER_RING_COUNT as u32 * percent as u32 / 100) as usize).max(1);
        let inner_n = ((INNER_RING_COUNT as u32 * percent as u32 / 100) as usize).max(1);
        fill_window(pixels, OUTER_RING_OFFSET, OUTER_RING_COUNT, Rgb::BLACK);
        fill_window(pixels, INNER_RING_OFFSET, INNER_RING_COUNT, Rgb::BLACK);
        fill_window(pixels, OUTER_RING_OFFSET, outer_n.min(OUTER_RING_COUNT), Rgb::BLUE);
        fill_window(pixels, INNER_RING_OFFSET, inner_n.min(INNER_RING_COUNT), Rgb::BLUE);
        true
    }
}

/// A colored sliding window rotating around a ring at a configured
/// revolutions/second. Shared by every status-indicator sub-handler
/// (BLE enabled/connected/reconnecting, OTA in progress).
pub struct RotationEngine {
    ring_offset: usize,
    ring_count: usize,
    width: usize,
    revolutions_per_second: f64,
    position: usize,
    next_draw_at: Tick,
}

impl RotationEngine {
    pub fn new(
        now: Tick,
        ring_offset: usize,
        ring_count: usize,
        width: usize,
        revolutions_per_second: f64,
    ) -> Self {
        Self {
            ring_offset,
            ring_count,
            width: width.min(ring_count).max(1),
            revolutions_per_second,
            position: 0,
            next_draw_at: now,
        }
    }

    fn hold_ms(&self) -> u32 {
        if self.revolutions_per_second <= 0.0 || self.ring_count == 0 {
            return u32::MAX;
        }
        (1000.0 / (self.ring_count as f64 * self.revolutions_per_second)) as u32
    }

    pub fn tick(&mut self, now: Tick, base_color: Rgb, sweep_color: Rgb, pixels: &mut [Rgb]) -> bool {
        if !crate::time::expired(now, self.next_draw_at) {
            return false;
        }
        fill_window(pixels, self.ring_offset, self.ring_count, base_color);
        for i in 0..self.width {
            let idx = self.ring_offset + (self.position + i) % self.ring_count;
            if idx < pixels.len() {
                pixels[idx] = sweep_color;
            }
        }
        self.position = (self.position + 1) % self.ring_count;
        self.next_draw_at = crate::time::future(now, self.hold_ms());
        true
    }
}

/// Outer ring rotates the event color at four equally-spaced positions;
/// inner ring pulses intensity proportional to time remaining.
pub struct GameEventRenderer {
    color: Rgb,
    outer_position: usize,
    next_outer_draw_at: Tick,
    pulse_direction: i8,
    pulse_intensity: u8,
    next_pulse_at: Tick,
}

const GAME_EVENT_OUTER_SPOKES: usize = 4;
const PULSE_MIN_INTENSITY: u8 = 20;
const PULSE_MAX_INTENSITY: u8 = 100;

impl GameEventRenderer {
    pub fn new(now: Tick, color: GameColor) -> Self {
        Self {
            color: game_color_to_rgb(color),
            outer_position: 0,
            next_outer_draw_at: now,
            pulse_direction: 1,
            pulse_intensity: PULSE_MIN_INTENSITY,
            next_pulse_at: now,
        }
    }

    pub fn tick(&mut self, now: Tick, ms_remaining: u32, pixels: &mut [Rgb]) -> bool {
        let mut changed = false;

        if crate::time::expired(now, self.next_outer_draw_at) {
            fill_window(pixels, OUTER_RING_OFFSET, OUTER_RING_COUNT, Rgb::BLACK);
            let step = OUTER_RING_COUNT / GAME_EVENT_OUTER_SPOKES;
            for spoke in 0..GAME_EVENT_OUTER_SPOKES {
                let idx = OUTER_RING_OFFSET + (self.outer_position + spoke * step) % OUTER_RING_COUNT;
                if idx < pixels.len() {
                    pixels[idx] = self.color;
                }
            }
            self.outer_position = (self.outer_position + 1) % OUTER_RING_COUNT;
            self.next_outer_draw_at = crate::time::future(now, 100);
            changed = true;
        }

        if crate::time::expired(now, self.next_pulse_at) {
            let urgency = 1.0 - (ms_remaining as f64 / MAX_EVENT_MS as f64).clamp(0.0, 1.0);
            let pulse_rate_ms = (200.0 - urgency * 150.0).max(20.0) as u32;

            let next = self.pulse_intensity as i16 + (self.pulse_direction as i16 * 4);
            if next >= PULSE_MAX_INTENSITY as i16 {
                self.pulse_intensity = PULSE_MAX_INTENSITY;
                self.pulse_direction = -1;
            } else if next <= PULSE_MIN_INTENSITY as i16 {
                self.pulse_intensity = PULSE_MIN_INTENSITY;
                self.pulse_direction = 1;
            } else {
                self.pulse_intensity = next as u8;
            }

            fill_window(
                pixels,
                INNER_RING_OFFSET,
                INNER_RING_COUNT,
                self.color.scaled(self.pulse_intensity),
            );
            self.next_pulse_at = crate::time::future(now, pulse_rate_ms);
            changed = true;
        }

        changed
    }
}

/// Interactive-game per-electrode light mapping: each of the 9 electrode
/// bits lights a fixed LED group (two consecutive outer-ring pixels here,
/// a simplification of the original firmware's hand-tuned per-bit offsets).
pub fn render_interactive_game(bits: u16, last_failed: bool, random_color: Rgb, pixels: &mut [Rgb]) {
    fill_window(pixels, OUTER_RING_OFFSET, OUTER_RING_COUNT, Rgb::BLACK);
    let color = if last_failed { Rgb::RED } else { random_color };
    let group_width = OUTER_RING_COUNT / NUM_ELECTRODES;
    for electrode in 0..NUM_ELECTRODES {
        if bits & (1 << electrode) != 0 {
            let offset = OUTER_RING_OFFSET + electrode * group_width;
            fill_window(pixels, offset, group_width, color);
        }
    }
}

/// Maps a 0-11 semitone within an octave to a color band; used by the
/// synth/song mode to color the ring by the note currently playing.
pub fn color_for_octave(octave: u8) -> Rgb {
    match octave % 3 {
        0 => Rgb::BLUE,
        1 => Rgb::GREEN,
        _ => Rgb::PURPLE,
    }
}

/// Per-electrode touch classification color mapping.
pub fn color_for_touch_state(state: TouchState) -> Rgb {
    match state {
        TouchState::Released => Rgb::BLACK,
        TouchState::Touched => Rgb::new(0, 80, 160),
        TouchState::ShortPressed => Rgb::GREEN,
        TouchState::LongPressed => Rgb::ORANGE,
        TouchState::VeryLongPressed => Rgb::RED,
    }
}

pub fn render_touch(states: &[TouchState; NUM_ELECTRODES], pixels: &mut [Rgb]) {
    let group_width = OUTER_RING_COUNT / NUM_ELECTRODES;
    for (electrode, state) in states.iter().enumerate() {
        let offset = OUTER_RING_OFFSET + electrode * group_width;
        fill_window(pixels, offset, group_width, color_for_touch_state(*state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_color_bands_match_spec_thresholds() {
        assert_eq!(BatteryIndicator::color_for_percent(95), Rgb::BLUE);
        assert_eq!(BatteryIndicator::color_for_percent(50), Rgb::GREEN);
        assert_eq!(BatteryIndicator::color_for_percent(25), Rgb::ORANGE);
        assert_eq!(BatteryIndicator::color_for_percent(10), Rgb::RED);
    }

    #[test]
    fn battery_indicator_completes_after_hold_duration() {
        let indicator = BatteryIndicator::new(0, 1000);
        let mut pixels = vec![Rgb::BLACK; STRIP_LEN];
        assert!(!indicator.render(500, 80, &mut pixels));
        assert!(indicator.render(1000, 80, &mut pixels));
    }

    #[test]
    fn ble_transfer_percent_only_redraws_on_change() {
        let mut xfer = BleTransferPercent::default();
        let mut pixels = vec![Rgb::BLACK; STRIP_LEN];
        assert!(xfer.render_if_changed(50, &mut pixels));
        assert!(!xfer.render_if_changed(50, &mut pixels));
        assert!(xfer.render_if_changed(75, &mut pixels));
    }

    #[test]
    fn rotation_engine_advances_position_each_tick() {
        let mut engine = RotationEngine::new(0, OUTER_RING_OFFSET, OUTER_RING_COUNT, 3, 1.0);
        let mut pixels = vec![Rgb::BLACK; STRIP_LEN];
        assert!(engine.tick(0, Rgb::BLACK, Rgb::BLUE, &mut pixels));
        let hold = engine.hold_ms();
        assert!(!engine.tick(1, Rgb::BLACK, Rgb::BLUE, &mut pixels));
        assert!(engine.tick(hold, Rgb::BLACK, Rgb::BLUE, &mut pixels));
    }

    #[test]
    fn interactive_game_paints_red_on_last_failed() {
        let mut pixels = vec![Rgb::BLACK; STRIP_LEN];
        render_interactive_game(0b1, true, Rgb::GREEN, &mut pixels);
        assert_eq!(pixels[OUTER_RING_OFFSET], Rgb::RED);
    }
}
