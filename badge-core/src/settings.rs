//! User-visible persistent settings.
//!
//! Grounded on `original_source/main/inc/UserSettings.h`'s `UserSettings`
//! struct (selected sequence index, sound/vibration flags, pair id, wifi
//! credentials) and the settings-update handler split across
//! `original_source/main/src/UserSettings.c` and
//! `main/src/BleControl_ServiceChar_FileTransfer.c`. Storage
//! (read/write/dirty-flag/flush) lives in [`crate::store`]; this module is
//! the record shape plus the partial-JSON-update rule.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SSID_MAX_LEN: usize = 32;
pub const PASSWORD_MAX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl Default for WifiCredentials {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub selected_led_sequence_index: u8,
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
    pub pair_id: [u8; 8],
    pub wifi: WifiCredentials,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            selected_led_sequence_index: 0,
            sound_enabled: true,
            vibration_enabled: true,
            pair_id: [0u8; 8],
            wifi: WifiCredentials::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsUpdateError {
    #[error("ssid exceeds {SSID_MAX_LEN} bytes")]
    SsidTooLong,
    #[error("password exceeds {PASSWORD_MAX_LEN} bytes")]
    PasswordTooLong,
}

/// Partial update, as decoded from the BLE settings-write JSON body.
/// Any field left `None` is left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibrations: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sounds: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led_sequence: Option<u8>,
}

impl UserSettings {
    /// Applies a partial update atomically: either every field validates
    /// and all are applied, or none are (so a settings write can never
    /// leave the record half-updated).
    pub fn apply_update(&mut self, update: &SettingsUpdate) -> Result<(), SettingsUpdateError> {
        if let Some(ssid) = &update.ssid {
            if ssid.len() > SSID_MAX_LEN {
                return Err(SettingsUpdateError::SsidTooLong);
            }
        }
        if let Some(pass) = &update.pass {
            if pass.len() > PASSWORD_MAX_LEN {
                return Err(SettingsUpdateError::PasswordTooLong);
            }
        }

        if let Some(v) = update.vibrations {
            self.vibration_enabled = v;
        }
        if let Some(s) = update.sounds {
            self.sound_enabled = s;
        }
        if let Some(ssid) = &update.ssid {
            self.wifi.ssid = ssid.clone();
        }
        if let Some(pass) = &update.pass {
            self.wifi.password = pass.clone();
        }
        if let Some(idx) = update.led_sequence {
            self.selected_led_sequence_index = idx;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_only_touches_named_fields() {
        let mut settings = UserSettings::default();
        settings.wifi.ssid = "old".into();
        let update = SettingsUpdate {
            sounds: Some(false),
            ..Default::default()
        };
        settings.apply_update(&update).unwrap();
        assert!(!settings.sound_enabled);
        assert_eq!(settings.wifi.ssid, "old");
    }

    #[test]
    fn oversize_ssid_is_rejected_and_nothing_applied() {
        let mut settings = UserSettings::default();
        let update = SettingsUpdate {
            sounds: Some(false),
            ssid: Some("x".repeat(SSID_MAX_LEN + 1)),
            ..Default::default()
        };
        let err = settings.apply_update(&update).unwrap_err();
        assert_eq!(err, SettingsUpdateError::SsidTooLong);
        assert!(settings.sound_enabled, "unrelated field must stay untouched on rejection");
    }
}
