//! Task priority table.
//!
//! Grounded on `original_source/main/inc/TaskPriorities.h`. FreeRTOS
//! priority numbers increase with importance; the badge-core scheduler
//! doesn't run a real scheduler itself (the firmware crate's OS does), so
//! these constants exist purely as a documented, order-checked reference
//! for whoever wires tasks to a real `esp-idf-hal`/FreeRTOS priority.

pub const BLE_CONTROL_TASK_PRIORITY: u8 = 21;
pub const LED_CONTROL_TASK_PRIORITY: u8 = 15;
pub const TOUCH_SENSOR_TASK_PRIORITY: u8 = 14;
pub const SYSTEM_STATE_TASK_PRIORITY: u8 = 13;
pub const SYNTH_MODE_TASK_PRIORITY: u8 = 12;
pub const HTTP_GAME_CLIENT_TASK_PRIORITY: u8 = 11;
pub const WIFI_CONTROL_TASK_PRIORITY: u8 = 10;
pub const GAME_STATE_TASK_PRIORITY: u8 = 9;
pub const CAPTIVE_DNS_TASK_PRIORITY: u8 = 8;
pub const NOTIFICATIONS_TASK_PRIORITY: u8 = 7;
pub const BLE_DISABLE_TASK_PRIORITY: u8 = 6;
pub const CONSOLE_TASK_PRIORITY: u8 = 5;
pub const USER_SETTINGS_TASK_PRIORITY: u8 = 4;
pub const BADGE_STAT_TASK_PRIORITY: u8 = 3;
pub const OTA_UPDATE_TASK_PRIORITY: u8 = 2;
pub const BATTERY_SENSE_TASK_PRIORITY: u8 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_realtime_tasks_outrank_background_services() {
        assert!(BLE_CONTROL_TASK_PRIORITY > LED_CONTROL_TASK_PRIORITY);
        assert!(LED_CONTROL_TASK_PRIORITY > TOUCH_SENSOR_TASK_PRIORITY);
        assert!(TOUCH_SENSOR_TASK_PRIORITY > SYSTEM_STATE_TASK_PRIORITY);
        assert!(BATTERY_SENSE_TASK_PRIORITY < OTA_UPDATE_TASK_PRIORITY);
        assert!(OTA_UPDATE_TASK_PRIORITY < BADGE_STAT_TASK_PRIORITY);
    }

    #[test]
    fn every_priority_is_unique() {
        let mut values = [
            BLE_CONTROL_TASK_PRIORITY,
            LED_CONTROL_TASK_PRIORITY,
            TOUCH_SENSOR_TASK_PRIORITY,
            SYSTEM_STATE_TASK_PRIORITY,
            SYNTH_MODE_TASK_PRIORITY,
            HTTP_GAME_CLIENT_TASK_PRIORITY,
            WIFI_CONTROL_TASK_PRIORITY,
            GAME_STATE_TASK_PRIORITY,
            CAPTIVE_DNS_TASK_PRIORITY,
            NOTIFICATIONS_TASK_PRIORITY,
            BLE_DISABLE_TASK_PRIORITY,
            CONSOLE_TASK_PRIORITY,
            USER_SETTINGS_TASK_PRIORITY,
            BADGE_STAT_TASK_PRIORITY,
            OTA_UPDATE_TASK_PRIORITY,
            BATTERY_SENSE_TASK_PRIORITY,
        ];
        values.sort_unstable();
        for pair in values.windows(2) {
            assert_ne!(pair[0], pair[1], "priority table must not assign the same priority twice");
        }
    }
}
