//! Peer discovery bookkeeping: RSSI-max peer map and seen-event set.
//!
//! Grounded on `spec.md` §4.10/§8 ("PeerMap monotonic peak RSSI", "25th
//! unique peer inserted, 26th dropped", "heartbeat drain atomicity") and
//! `original_source/main/inc/GameTypes.h`'s `PeerReport`/`MAX_PEER_MAP_DEPTH`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::BadgeType;

pub const MAX_PEER_MAP_DEPTH: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerReport {
    pub badge_id_b64: String,
    pub event_id_b64: String,
    pub peak_rssi: i16,
    pub badge_type: BadgeType,
}

/// Bounded map from badge id to its aggregated peer report. Ownership per
/// `spec.md` §4.10: populated by the BLE observer, drained atomically when a
/// heartbeat is sent.
#[derive(Default)]
pub struct PeerMap {
    entries: HashMap<String, PeerReport>,
    /// Insertion order, so the 25-cap is "first 25 distinct ids seen since
    /// last drain", not an arbitrary hash-order eviction.
    order: Vec<String>,
}

impl PeerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records one beacon observation. If `badge_id_b64` is already present,
    /// overwrites its event id and raises `peak_rssi` only if `rssi` is
    /// larger (less negative). If the map is full and this is a new id, the
    /// observation is dropped (cap = [`MAX_PEER_MAP_DEPTH`]).
    ///
    /// Returns `true` if this is the first sighting of `event_id_b64` in the
    /// current drain window, which the game-state task uses to trigger an
    /// immediate heartbeat.
    pub fn observe(
        &mut self,
        badge_id_b64: &str,
        event_id_b64: &str,
        rssi: i16,
        badge_type: BadgeType,
    ) -> bool {
        if let Some(existing) = self.entries.get_mut(badge_id_b64) {
            existing.event_id_b64 = event_id_b64.to_string();
            if rssi > existing.peak_rssi {
                existing.peak_rssi = rssi;
            }
            return false;
        }

        if self.entries.len() >= MAX_PEER_MAP_DEPTH {
            return false;
        }

        self.entries.insert(
            badge_id_b64.to_string(),
            PeerReport {
                badge_id_b64: badge_id_b64.to_string(),
                event_id_b64: event_id_b64.to_string(),
                peak_rssi: rssi,
                badge_type,
            },
        );
        self.order.push(badge_id_b64.to_string());
        true
    }

    /// Snapshots current reports in insertion order without clearing them.
    pub fn snapshot(&self) -> Vec<PeerReport> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }

    /// Atomically takes all reports and empties the map, for heartbeat
    /// assembly.
    pub fn drain(&mut self) -> Vec<PeerReport> {
        let reports = self.snapshot();
        self.entries.clear();
        self.order.clear();
        reports
    }
}

/// Tracks which event ids have been observed via peer beacons, so a new
/// non-blank event id triggers an immediate heartbeat exactly once.
#[derive(Default)]
pub struct SeenEventMap {
    seen: std::collections::HashSet<String>,
}

impl SeenEventMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` iff `event_id_b64` is non-blank and has not been
    /// recorded before, and records it as seen.
    pub fn observe(&mut self, event_id_b64: &str) -> bool {
        if event_id_b64.is_empty() || event_id_b64.chars().all(|c| c == 'A' || c == '=') {
            // all-zero 8 bytes base64-encodes to "AAAAAAAAAAA=" (A's with
            // '=' padding); treat as the blank/unset event id.
            return false;
        }
        self.seen.insert(event_id_b64.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_rssi_is_monotonic_max() {
        let mut map = PeerMap::new();
        map.observe("AAA", "EEE", -60, BadgeType::Tron);
        map.observe("AAA", "EEE", -80, BadgeType::Tron);
        map.observe("AAA", "EEE", -40, BadgeType::Tron);
        let reports = map.snapshot();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].peak_rssi, -40);
    }

    #[test]
    fn twenty_fifth_peer_is_inserted_twenty_sixth_is_dropped() {
        let mut map = PeerMap::new();
        for i in 0..25 {
            let id = format!("peer-{i}");
            assert!(map.observe(&id, "evt", -50, BadgeType::Crest));
        }
        assert_eq!(map.len(), 25);
        assert!(!map.observe("peer-25", "evt", -50, BadgeType::Crest));
        assert_eq!(map.len(), 25);
    }

    #[test]
    fn drain_empties_the_map_atomically() {
        let mut map = PeerMap::new();
        map.observe("AAA", "EEE", -50, BadgeType::Reactor);
        let drained = map.drain();
        assert_eq!(drained.len(), 1);
        assert!(map.is_empty());
        assert_eq!(map.snapshot().len(), 0);
    }

    #[test]
    fn event_id_triggers_heartbeat_only_on_first_sighting() {
        let mut seen = SeenEventMap::new();
        assert!(seen.observe("EBESExQVFhc="));
        assert!(!seen.observe("EBESExQVFhc="));
    }

    #[test]
    fn blank_event_id_never_triggers() {
        let mut seen = SeenEventMap::new();
        assert!(!seen.observe("AAAAAAAAAAA="));
        assert!(!seen.observe(""));
    }
}
