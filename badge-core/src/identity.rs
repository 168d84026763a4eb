//! Badge identity: deterministic 8-byte id/key derived from the hardware
//! MAC address, plus cached base64 encodings (used constantly in beacons,
//! BLE reads and heartbeat bodies).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Salt mixed into the MAC before hashing so badge ids aren't trivially
/// reversible to a MAC address. Matches the role of `BADGE_SALT` in the
/// original firmware.
const BADGE_ID_SALT: &[u8] = b"badge-id-v1";
const KEY_SALT: &[u8] = b"badge-key-v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BadgeType {
    Tron = 1,
    Reactor = 2,
    Crest = 3,
    Fman25 = 4,
}

impl BadgeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Tron),
            2 => Some(Self::Reactor),
            3 => Some(Self::Crest),
            4 => Some(Self::Fman25),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeId(pub [u8; 8]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key(pub [u8; 8]);

fn derive8(salt: &[u8], mac: &[u8; 6]) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(mac);
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

impl BadgeId {
    pub fn from_mac(mac: &[u8; 6]) -> Self {
        Self(derive8(BADGE_ID_SALT, mac))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 8]
    }
}

impl Key {
    pub fn from_mac(mac: &[u8; 6]) -> Self {
        Self(derive8(KEY_SALT, mac))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

/// Encodes an arbitrary 8-byte id (pair id, event id) the same way.
pub fn id_to_base64(id: &[u8; 8]) -> String {
    STANDARD.encode(id)
}

pub fn id_from_base64(s: &str) -> Option<[u8; 8]> {
    let bytes = STANDARD.decode(s).ok()?;
    if bytes.len() != 8 {
        return None;
    }
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let mac = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let a = BadgeId::from_mac(&mac);
        let b = BadgeId::from_mac(&mac);
        assert_eq!(a, b);
    }

    #[test]
    fn badge_id_and_key_differ_for_same_mac() {
        let mac = [0xAA; 6];
        let id = BadgeId::from_mac(&mac);
        let key = Key::from_mac(&mac);
        assert_ne!(id.0, key.0);
    }

    #[test]
    fn base64_round_trips() {
        let id = [1, 2, 3, 4, 5, 6, 7, 8];
        let encoded = id_to_base64(&id);
        assert_eq!(id_from_base64(&encoded), Some(id));
    }

    #[test]
    fn badge_type_maps_known_values() {
        assert_eq!(BadgeType::from_u8(2), Some(BadgeType::Reactor));
        assert_eq!(BadgeType::from_u8(0), None);
    }
}
