//! BLE service layer: advertisement scanning/parsing, file-transfer frame
//! reassembly, and the interactive-game bitfield characteristic.
//!
//! Grounded on `original_source/main/inc/BleControl.h` and its
//! `BleControl_Service`/`BleControl_AdvScan`/`BleControl_ServiceChar_*`
//! translation units, and on `firmware/src/bluetooth.rs` for the
//! esp32-nimble-facing idioms (GATT characteristic setup, connection
//! handling) this module's firmware-side adapter should follow — this
//! crate stays free of `esp32-nimble` types so it can be unit tested.
//! Service enable/disable and inactivity timeout are modeled as
//! `Effect`s in [`crate::coordinator`], not duplicated here.

pub mod frame_transfer;
pub mod interactive_game;
pub mod scan;

pub use frame_transfer::{ConfigOutcome, DataOutcome, FrameContext, FrameError};
pub use interactive_game::InteractiveGameBits;
pub use scan::{matches_pairing_request, pairing_request_uuid, parse_peer_beacon};

/// Fixed-layout read response for the file-transfer characteristic,
/// grounded on `BleControl_Service.h`'s `BleFileTransferResponseData`. The
/// original's bitfield byte (`soundEnabled:1, vibrationEnabled:1, unused:6`)
/// becomes an explicit pack/unpack pair rather than a `#[repr(packed)]`
/// struct, per `spec.md` §9's design notes on packed BLE structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsReadResponse {
    pub badge_id: [u8; 8],
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
    pub badge_type: u8,
    pub song_bits: u16,
    pub ssid: [u8; 32],
}

impl SettingsReadResponse {
    /// Wire length: `8 (badgeId) + 1 (packed bits) + 1 (badgeType) + 2
    /// (songBits, little-endian) + 32 (ssid)`.
    pub const WIRE_LEN: usize = 8 + 1 + 1 + 2 + 32;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0..8].copy_from_slice(&self.badge_id);
        let mut packed = 0u8;
        if self.sound_enabled {
            packed |= 0b0000_0001;
        }
        if self.vibration_enabled {
            packed |= 0b0000_0010;
        }
        out[8] = packed;
        out[9] = self.badge_type;
        out[10..12].copy_from_slice(&self.song_bits.to_le_bytes());
        out[12..44].copy_from_slice(&self.ssid);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_read_response_packs_bits_into_a_single_byte() {
        let response = SettingsReadResponse {
            badge_id: [1; 8],
            sound_enabled: true,
            vibration_enabled: false,
            badge_type: 2,
            song_bits: 0x00FF,
            ssid: [0; 32],
        };
        let bytes = response.to_bytes();
        assert_eq!(bytes[8], 0b0000_0001);
        assert_eq!(bytes[9], 2);
        assert_eq!(&bytes[10..12], &0x00FFu16.to_le_bytes());
    }
}
