//! Passive BLE advertisement parsing: peer beacons and the service-enable
//! request UUID.
//!
//! Grounded on `original_source/main/inc/BleControl_AdvScan.h` /
//! `main/src/BleControl_AdvScan.c`. The real NimBLE scan is passive,
//! non-duplicate-filtered, and runs forever; this module only implements
//! `_BleControl_ProcessAdvertisement`'s pure parsing, so it can be unit
//! tested without a radio.

use crate::identity::{id_to_base64, BadgeType};
use crate::peers::PeerReport;

/// `EVENT_ADV_MAGIC_NUMBER` from `BleControl.h`.
pub const EVENT_ADV_MAGIC_NUMBER: u16 = 0x1337;
pub const BADGE_ID_SIZE: usize = 8;
pub const EVENT_ID_SIZE: usize = 8;
pub const PAIR_ID_SIZE: usize = 8;

/// `IwcAdvertisingPayload`'s on-the-wire size: `u16 + u8 + [u8;8] + [u8;8]`.
pub const PEER_BEACON_LEN: usize = 2 + 1 + BADGE_ID_SIZE + EVENT_ID_SIZE;

/// Parses a peer beacon out of a BLE manufacturer-data payload, mirroring
/// `_BleControl_ParseEventAdvertisingPacket`'s `mfg_data_len` and magic
/// number checks. Little-endian `magicNum`, matching the original's
/// on-device struct layout on an ESP32 (little-endian ARM/Xtensa).
pub fn parse_peer_beacon(mfg_data: &[u8], rssi: i16) -> Option<PeerReport> {
    if mfg_data.len() != PEER_BEACON_LEN {
        return None;
    }
    let magic = u16::from_le_bytes([mfg_data[0], mfg_data[1]]);
    if magic != EVENT_ADV_MAGIC_NUMBER {
        return None;
    }
    let badge_type = BadgeType::from_u8(mfg_data[2])?;
    let mut badge_id = [0u8; BADGE_ID_SIZE];
    badge_id.copy_from_slice(&mfg_data[3..3 + BADGE_ID_SIZE]);
    let mut event_id = [0u8; EVENT_ID_SIZE];
    event_id.copy_from_slice(&mfg_data[3 + BADGE_ID_SIZE..3 + BADGE_ID_SIZE + EVENT_ID_SIZE]);

    Some(PeerReport {
        badge_id_b64: id_to_base64(&badge_id),
        event_id_b64: id_to_base64(&event_id),
        peak_rssi: rssi,
        badge_type,
    })
}

/// Builds the 16-byte service-data UUID a peer broadcasts to request BLE
/// service pairing mode, mirroring
/// `_BleControl_ParseEnableBleServiceAdvertisingPacket`'s `toCheck` buffer:
/// 6 zero bytes, then `pair_id` reversed, then the fixed `{0x38, 0x13}`
/// suffix — `16 - (PAIR_ID_SIZE + 2) = 6` leading bytes.
pub fn pairing_request_uuid(pair_id: &[u8; PAIR_ID_SIZE]) -> [u8; 16] {
    let mut uuid = [0u8; 16];
    for (i, byte) in pair_id.iter().rev().enumerate() {
        uuid[6 + i] = *byte;
    }
    uuid[14] = 0x38;
    uuid[15] = 0x13;
    uuid
}

/// `_BleControl_ParseEnableBleServiceAdvertisingPacket`: true iff
/// `scanned_uuid128` requests pairing for `our_pair_id`.
pub fn matches_pairing_request(scanned_uuid128: &[u8; 16], our_pair_id: &[u8; PAIR_ID_SIZE]) -> bool {
    *scanned_uuid128 == pairing_request_uuid(our_pair_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon_bytes(badge_type: u8, badge_id: [u8; 8], event_id: [u8; 8]) -> Vec<u8> {
        let mut v = Vec::with_capacity(PEER_BEACON_LEN);
        v.extend_from_slice(&EVENT_ADV_MAGIC_NUMBER.to_le_bytes());
        v.push(badge_type);
        v.extend_from_slice(&badge_id);
        v.extend_from_slice(&event_id);
        v
    }

    #[test]
    fn parses_a_valid_peer_beacon() {
        let bytes = beacon_bytes(BadgeType::Reactor as u8, [1; 8], [2; 8]);
        let report = parse_peer_beacon(&bytes, -42).unwrap();
        assert_eq!(report.peak_rssi, -42);
        assert_eq!(report.badge_type, BadgeType::Reactor);
        assert_eq!(report.badge_id_b64, id_to_base64(&[1; 8]));
        assert_eq!(report.event_id_b64, id_to_base64(&[2; 8]));
    }

    #[test]
    fn rejects_unknown_badge_type() {
        let bytes = beacon_bytes(0xEE, [1; 8], [2; 8]);
        assert!(parse_peer_beacon(&bytes, 0).is_none());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(parse_peer_beacon(&[0u8; 5], 0).is_none());
    }

    #[test]
    fn rejects_wrong_magic_number() {
        let mut bytes = beacon_bytes(1, [0; 8], [0; 8]);
        bytes[0] = 0x00;
        bytes[1] = 0x00;
        assert!(parse_peer_beacon(&bytes, 0).is_none());
    }

    #[test]
    fn pairing_request_uuid_reverses_pair_id_into_the_low_bytes() {
        let pair_id = [1, 2, 3, 4, 5, 6, 7, 8];
        let uuid = pairing_request_uuid(&pair_id);
        assert_eq!(&uuid[0..6], &[0, 0, 0, 0, 0, 0]);
        assert_eq!(&uuid[6..14], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&uuid[14..16], &[0x38, 0x13]);
    }

    #[test]
    fn matches_pairing_request_round_trips() {
        let pair_id = [9u8; 8];
        let uuid = pairing_request_uuid(&pair_id);
        assert!(matches_pairing_request(&uuid, &pair_id));
        assert!(!matches_pairing_request(&uuid, &[0u8; 8]));
    }
}
