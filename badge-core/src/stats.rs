//! Persistent usage counters.
//!
//! Grounded on `original_source/main/inc/GameTypes.h`'s `BadgeStats` struct
//! and the counter-increment call sites scattered through the original
//! firmware's touch/BLE/network handlers. This is a plain fixed-layout
//! record; persistence (file read/write, dirty flag, periodic flush) lives
//! in [`crate::store`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeStats {
    pub power_on_count: u32,
    pub touch_count: u32,
    pub touch_command_count: u32,
    pub led_cycle_count: u32,
    pub battery_check_count: u32,
    pub ble_enable_count: u32,
    pub ble_disable_count: u32,
    pub ble_sequence_transfer_count: u32,
    pub ble_settings_transfer_count: u32,
    pub uart_input_count: u32,
    pub network_test_count: u32,
}

impl Default for BadgeStats {
    fn default() -> Self {
        Self {
            power_on_count: 0,
            touch_count: 0,
            touch_command_count: 0,
            led_cycle_count: 0,
            battery_check_count: 0,
            ble_enable_count: 0,
            ble_disable_count: 0,
            ble_sequence_transfer_count: 0,
            ble_settings_transfer_count: 0,
            uart_input_count: 0,
            network_test_count: 0,
        }
    }
}

impl BadgeStats {
    /// Saturating increments: a stuck-at-max counter is a far better
    /// failure mode than wrapping back to zero and looking freshly reset.
    pub fn record_power_on(&mut self) {
        self.power_on_count = self.power_on_count.saturating_add(1);
    }

    pub fn record_touch(&mut self) {
        self.touch_count = self.touch_count.saturating_add(1);
    }

    pub fn record_touch_command(&mut self) {
        self.touch_command_count = self.touch_command_count.saturating_add(1);
    }

    pub fn record_led_cycle(&mut self) {
        self.led_cycle_count = self.led_cycle_count.saturating_add(1);
    }

    pub fn record_battery_check(&mut self) {
        self.battery_check_count = self.battery_check_count.saturating_add(1);
    }

    pub fn record_ble_enable(&mut self) {
        self.ble_enable_count = self.ble_enable_count.saturating_add(1);
    }

    pub fn record_ble_disable(&mut self) {
        self.ble_disable_count = self.ble_disable_count.saturating_add(1);
    }

    pub fn record_ble_sequence_transfer(&mut self) {
        self.ble_sequence_transfer_count = self.ble_sequence_transfer_count.saturating_add(1);
    }

    pub fn record_ble_settings_transfer(&mut self) {
        self.ble_settings_transfer_count = self.ble_settings_transfer_count.saturating_add(1);
    }

    pub fn record_uart_input(&mut self) {
        self.uart_input_count = self.uart_input_count.saturating_add(1);
    }

    pub fn record_network_test(&mut self) {
        self.network_test_count = self.network_test_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = BadgeStats::default();
        assert_eq!(stats.power_on_count, 0);
        assert_eq!(stats.touch_count, 0);
    }

    #[test]
    fn counters_saturate_instead_of_wrapping() {
        let mut stats = BadgeStats {
            touch_count: u32::MAX,
            ..Default::default()
        };
        stats.record_touch();
        assert_eq!(stats.touch_count, u32::MAX);
    }

    #[test]
    fn serde_round_trips() {
        let mut stats = BadgeStats::default();
        stats.record_power_on();
        stats.record_touch();
        let json = serde_json::to_string(&stats).unwrap();
        let back: BadgeStats = serde_json::from_str(&json).unwrap();
        assert_eq!(stats, back);
    }
}
