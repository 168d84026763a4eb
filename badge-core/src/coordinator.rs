//! System coordinator: global mode flags, LED-mode priority arbitration,
//! and touch-command handling.
//!
//! Grounded on `spec.md` §4.7 and `original_source/main/src/SystemState.c`'s
//! flag-driven mode machine. Kept pure: `handle_command` and `arbitrate`
//! return data (`Effect`s, an `LedMode`) rather than reaching for a bus or
//! timer service directly, so the whole state machine is testable without
//! spawning a thread. The `firmware` crate's coordinator task applies the
//! returned effects to the real bus/pipeline/timer service.

use crate::led::LedMode;
use crate::touch_actions::TouchCommand;

pub const TOUCH_ACTIVE_TIMEOUT_MS: u32 = 5_000;
pub const SEQUENCE_PREVIEW_TIMEOUT_MS: u32 = 2_000;
pub const NETWORK_TEST_TIMEOUT_MS: u32 = 10_000;
pub const TOUCH_ENABLE_VIBRATION_MS: u32 = 500;
pub const BLE_INACTIVITY_TIMEOUT_MS: u32 = 60_000;
pub const BLE_RECONNECT_INACTIVITY_TIMEOUT_MS: u32 = 10_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub touch_active: bool,
    pub battery_indicator_active: bool,
    pub game_event_active: bool,
    pub led_game_status_active: bool,
    pub network_test_active: bool,
    pub peer_song_playing: bool,
    pub peer_song_cooldown: bool,
    pub ble_reconnecting: bool,
    pub interactive_game_active: bool,
    pub song_playing: bool,
    pub led_sequence_preview_active: bool,
    pub ota_in_progress: bool,
    pub ble_file_transfer_in_progress: bool,
    pub ble_connected: bool,
    pub ble_service_enabled: bool,
}

/// Resolves the current flag set to the single LED mode that should be
/// displayed, per the 14-level priority order in `spec.md` §4.7. A flag set
/// of all-false always resolves to `Sequence` (level 14, the default).
///
/// `led_game_status_active` (level 13) shares the `GameEvent` renderer with
/// `game_event_active` (level 12): the source distinguishes the two flags
/// but neither `spec.md` nor the original render code gives the status
/// variant a distinct visual, so this arbitrator maps both to the same
/// mode and relies on flag priority alone to pick the winner when both are
/// set.
pub fn arbitrate(flags: &Flags) -> LedMode {
    if flags.ble_reconnecting {
        return LedMode::BleReconnecting;
    }
    if flags.interactive_game_active {
        return LedMode::InteractiveGame;
    }
    if flags.song_playing {
        return LedMode::Song;
    }
    if flags.led_sequence_preview_active {
        return LedMode::Sequence;
    }
    if flags.ota_in_progress {
        return LedMode::OtaInProgress;
    }
    if flags.ble_file_transfer_in_progress {
        return LedMode::BleFileTransferPercent;
    }
    if flags.ble_connected {
        return LedMode::BleConnected;
    }
    if flags.ble_service_enabled {
        return LedMode::BleEnabled;
    }
    if flags.network_test_active {
        return LedMode::NetworkTestResult;
    }
    if flags.battery_indicator_active {
        return LedMode::BatteryIndicator;
    }
    if flags.touch_active {
        return LedMode::Touch;
    }
    if flags.game_event_active {
        return LedMode::GameEvent;
    }
    if flags.led_game_status_active {
        return LedMode::GameEvent;
    }
    LedMode::Sequence
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerId {
    TouchActiveTimeout,
    SequencePreviewTimeout,
    BatteryIndicatorTimeout,
    NetworkTestTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    SetLedMode(LedMode),
    ArmTimer(TimerId, u32),
    PulseVibration(u32),
    EnableTouchSensor,
    DisableTouchSensor,
    NotifyTouchEnabled,
    NotifyTouchDisabled,
    IncrementLedCycleStat,
    ClearPairId,
    RefreshServiceUuid,
    EnableBleServicePairingMode,
    RequestWifiTestConnect,
    EnableTouchToTone { octave_shift: i8 },
    DisableTouchToTone,
    EnableOcarinaMatcher,
    DisableOcarinaMatcher,
}

pub struct Coordinator {
    flags: Flags,
    mode: LedMode,
    synth_enabled: bool,
}

impl Coordinator {
    pub fn new() -> Self {
        let flags = Flags::default();
        Self {
            mode: arbitrate(&flags),
            flags,
            synth_enabled: false,
        }
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn current_mode(&self) -> LedMode {
        self.mode
    }

    /// Re-derives the winning mode from the current flags and, if it
    /// changed, appends a `SetLedMode` effect.
    fn rearbitrate(&mut self, effects: &mut Vec<Effect>) {
        let winner = arbitrate(&self.flags);
        if winner != self.mode {
            self.mode = winner;
            effects.push(Effect::SetLedMode(winner));
        }
    }

    pub fn handle_command(
        &mut self,
        command: TouchCommand,
        battery_draw_and_hold_ms: u32,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();

        match command {
            TouchCommand::Clear => {}
            TouchCommand::EnableTouch => {
                if !self.flags.touch_active {
                    self.flags.touch_active = true;
                    effects.push(Effect::ArmTimer(TimerId::TouchActiveTimeout, TOUCH_ACTIVE_TIMEOUT_MS));
                    effects.push(Effect::NotifyTouchEnabled);
                    effects.push(Effect::PulseVibration(TOUCH_ENABLE_VIBRATION_MS));
                    effects.push(Effect::EnableTouchSensor);
                }
            }
            TouchCommand::DisableTouch => {
                if self.flags.touch_active {
                    self.flags.touch_active = false;
                    effects.push(Effect::NotifyTouchDisabled);
                    effects.push(Effect::DisableTouchSensor);
                }
            }
            TouchCommand::NextLedSequence | TouchCommand::PrevLedSequence => {
                self.flags.led_sequence_preview_active = true;
                effects.push(Effect::ArmTimer(
                    TimerId::SequencePreviewTimeout,
                    SEQUENCE_PREVIEW_TIMEOUT_MS,
                ));
                effects.push(Effect::IncrementLedCycleStat);
            }
            TouchCommand::DisplayVoltageMeter => {
                self.flags.battery_indicator_active = true;
                effects.push(Effect::ArmTimer(
                    TimerId::BatteryIndicatorTimeout,
                    battery_draw_and_hold_ms,
                ));
            }
            TouchCommand::EnableBlePairing => {
                effects.push(Effect::ClearPairId);
                effects.push(Effect::RefreshServiceUuid);
                effects.push(Effect::EnableBleServicePairingMode);
            }
            TouchCommand::DisableBlePairing => {
                self.flags.ble_service_enabled = false;
            }
            TouchCommand::NetworkTest => {
                self.flags.network_test_active = true;
                effects.push(Effect::ArmTimer(TimerId::NetworkTestTimeout, NETWORK_TEST_TIMEOUT_MS));
                effects.push(Effect::RequestWifiTestConnect);
            }
            TouchCommand::ToggleSynthMode => {
                self.synth_enabled = !self.synth_enabled;
                if self.synth_enabled {
                    effects.push(Effect::EnableTouchToTone { octave_shift: 0 });
                    effects.push(Effect::EnableOcarinaMatcher);
                } else {
                    effects.push(Effect::DisableTouchToTone);
                    effects.push(Effect::DisableOcarinaMatcher);
                }
            }
        }

        self.rearbitrate(&mut effects);
        effects
    }

    /// Timer-fired callbacks, each clearing the flag it guards and
    /// re-running arbitration.
    pub fn on_touch_active_timeout(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.flags.touch_active = false;
        effects.push(Effect::NotifyTouchDisabled);
        self.rearbitrate(&mut effects);
        effects
    }

    pub fn on_sequence_preview_timeout(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.flags.led_sequence_preview_active = false;
        self.rearbitrate(&mut effects);
        effects
    }

    pub fn on_battery_indicator_timeout(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.flags.battery_indicator_active = false;
        self.rearbitrate(&mut effects);
        effects
    }

    pub fn on_network_test_timeout(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.flags.network_test_active = false;
        self.rearbitrate(&mut effects);
        effects
    }

    pub fn set_ble_reconnecting(&mut self, value: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.flags.ble_reconnecting = value;
        self.rearbitrate(&mut effects);
        effects
    }

    pub fn set_interactive_game_active(&mut self, value: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.flags.interactive_game_active = value;
        self.rearbitrate(&mut effects);
        effects
    }

    pub fn set_ble_service_enabled(&mut self, value: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.flags.ble_service_enabled = value;
        self.rearbitrate(&mut effects);
        effects
    }

    pub fn set_ble_connected(&mut self, value: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.flags.ble_connected = value;
        self.rearbitrate(&mut effects);
        effects
    }

    pub fn set_game_event_active(&mut self, value: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.flags.game_event_active = value;
        self.rearbitrate(&mut effects);
        effects
    }

    pub fn set_ota_in_progress(&mut self, value: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.flags.ota_in_progress = value;
        self.rearbitrate(&mut effects);
        effects
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_matches_spec_ranking() {
        let mut flags = Flags::default();
        flags.touch_active = true;
        flags.battery_indicator_active = true;
        assert_eq!(arbitrate(&flags), LedMode::BatteryIndicator);

        flags.ble_reconnecting = true;
        assert_eq!(arbitrate(&flags), LedMode::BleReconnecting);
    }

    #[test]
    fn all_flags_false_resolves_to_default_sequence() {
        assert_eq!(arbitrate(&Flags::default()), LedMode::Sequence);
    }

    #[test]
    fn enable_touch_is_a_no_op_when_already_active() {
        let mut coordinator = Coordinator::new();
        let first = coordinator.handle_command(TouchCommand::EnableTouch, 0);
        assert!(!first.is_empty());
        let second = coordinator.handle_command(TouchCommand::EnableTouch, 0);
        assert!(second.is_empty(), "already-active EnableTouch must produce no effects");
    }

    #[test]
    fn disable_touch_only_applies_when_active() {
        let mut coordinator = Coordinator::new();
        let no_op = coordinator.handle_command(TouchCommand::DisableTouch, 0);
        assert!(no_op.is_empty());
        coordinator.handle_command(TouchCommand::EnableTouch, 0);
        let effects = coordinator.handle_command(TouchCommand::DisableTouch, 0);
        assert!(effects.contains(&Effect::NotifyTouchDisabled));
    }

    #[test]
    fn arbitration_rerun_on_every_command_emits_set_led_mode_on_change() {
        let mut coordinator = Coordinator::new();
        let effects = coordinator.handle_command(TouchCommand::EnableTouch, 0);
        assert!(effects.contains(&Effect::SetLedMode(LedMode::Touch)));
    }

    #[test]
    fn determinism_same_flags_always_arbitrate_to_same_mode() {
        let flags = Flags {
            ble_connected: true,
            touch_active: true,
            ..Default::default()
        };
        let a = arbitrate(&flags);
        let b = arbitrate(&flags);
        assert_eq!(a, b);
    }
}
