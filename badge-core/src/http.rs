//! HTTP game-client request queue and wire DTOs.
//!
//! Grounded on `spec.md` §4.11 and `firmware/src/request.rs`'s `Requester`
//! abstraction (kept here as [`crate::hal::HttpTransport`]). The queue is a
//! plain `Vec`-backed, capacity-3, dedup-by-(method,kind) structure; dispatch
//! timing (Wi-Fi up, 100 ms poll, 12 s timeout) is the caller's
//! responsibility since it needs the `wifi` state machine and a real sleep.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::heartbeat::GameColor;
use crate::identity::BadgeType;
use crate::stats::BadgeStats;
use crate::time::Tick;

pub const REQUEST_QUEUE_CAPACITY: usize = 3;
pub const WIFI_TIMEOUT_MS: u32 = 12_000;
pub const HTTP_TIMEOUT_MS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Heartbeat,
    OtaCheck,
    NetworkTest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedRequest {
    pub method: Method,
    pub kind: RequestKind,
    pub send_at: Tick,
    pub expire_at: Tick,
    pub body: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("request queue is full")]
    Full,
}

/// Capacity-`REQUEST_QUEUE_CAPACITY` queue of pending HTTP requests, deduped
/// by `(method, kind)`.
#[derive(Default)]
pub struct RequestQueue {
    items: Vec<QueuedRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Enqueues a request. If one with the same `(method, kind)` already
    /// exists, its body and timing are overwritten in place; otherwise it is
    /// appended if capacity remains.
    pub fn enqueue(&mut self, request: QueuedRequest) -> Result<(), QueueError> {
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|item| item.method == request.method && item.kind == request.kind)
        {
            *existing = request;
            return Ok(());
        }

        if self.items.len() >= REQUEST_QUEUE_CAPACITY {
            return Err(QueueError::Full);
        }

        self.items.push(request);
        Ok(())
    }

    /// Drops every item whose `expire_at` has already passed.
    pub fn expire(&mut self, now: Tick) {
        self.items.retain(|item| !crate::time::expired(now, item.expire_at));
    }

    /// The item with the soonest `send_at`, if any.
    pub fn next_send_at(&self) -> Option<Tick> {
        self.items.iter().map(|item| item.send_at).min()
    }

    /// Takes every queued item in send-order, emptying the queue (step 5/6
    /// of the dispatch sequence: issue everything, then drain).
    pub fn drain_in_order(&mut self) -> Vec<QueuedRequest> {
        self.items.sort_by_key(|item| item.send_at);
        std::mem::take(&mut self.items)
    }
}

// --- Heartbeat wire body -----------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePeerReport {
    pub uuid: String,
    #[serde(rename = "peakRssi")]
    pub peak_rssi: i16,
    #[serde(rename = "eventUuid")]
    pub event_uuid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireStats {
    #[serde(rename = "powerOnCount")]
    pub power_on_count: u32,
    #[serde(rename = "touchCount")]
    pub touch_count: u32,
    #[serde(rename = "touchCommandCount")]
    pub touch_command_count: u32,
    #[serde(rename = "ledCycleCount")]
    pub led_cycle_count: u32,
    #[serde(rename = "batteryCheckCount")]
    pub battery_check_count: u32,
    #[serde(rename = "bleEnableCount")]
    pub ble_enable_count: u32,
    #[serde(rename = "bleDisableCount")]
    pub ble_disable_count: u32,
    #[serde(rename = "bleSequenceTransferCount")]
    pub ble_sequence_transfer_count: u32,
    #[serde(rename = "bleSettingsTransferCount")]
    pub ble_settings_transfer_count: u32,
    #[serde(rename = "uartInputCount")]
    pub uart_input_count: u32,
    #[serde(rename = "networkTestCount")]
    pub network_test_count: u32,
    #[serde(rename = "batteryPercent")]
    pub battery_percent: u8,
    #[serde(rename = "timestamp")]
    pub unix_seconds: u64,
}

impl WireStats {
    pub fn from_stats(stats: &BadgeStats, battery_percent: u8, unix_seconds: u64) -> Self {
        Self {
            power_on_count: stats.power_on_count,
            touch_count: stats.touch_count,
            touch_command_count: stats.touch_command_count,
            led_cycle_count: stats.led_cycle_count,
            battery_check_count: stats.battery_check_count,
            ble_enable_count: stats.ble_enable_count,
            ble_disable_count: stats.ble_disable_count,
            ble_sequence_transfer_count: stats.ble_sequence_transfer_count,
            ble_settings_transfer_count: stats.ble_settings_transfer_count,
            uart_input_count: stats.uart_input_count,
            network_test_count: stats.network_test_count,
            battery_percent,
            unix_seconds,
        }
    }
}

/// Constant echoed by the badge in every heartbeat body; the server uses it
/// to distinguish firmware-originated requests from other API clients.
pub const PROVISION_KEY: &str = "badge-core-v1";

/// Field order matches `spec.md` §4.11's fixed wire shape exactly: uuid,
/// key, provisionKey, peerReport, enrolledEvent, badgeRequestTime,
/// badgeType, songs, stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatBody {
    pub uuid: String,
    pub key: String,
    #[serde(rename = "provisionKey")]
    pub provision_key: String,
    #[serde(rename = "peerReport")]
    pub peer_report: Vec<WirePeerReport>,
    #[serde(rename = "enrolledEvent")]
    pub enrolled_event: String,
    #[serde(rename = "badgeRequestTime")]
    pub badge_request_time: Tick,
    #[serde(rename = "badgeType")]
    pub badge_type: u8,
    pub songs: Vec<u8>,
    pub stats: WireStats,
}

impl HeartbeatBody {
    pub fn song_indices_from_bits(song_unlocked_bits: u16) -> Vec<u8> {
        (0..16)
            .filter(|bit| song_unlocked_bits & (1 << bit) != 0)
            .map(|bit| bit as u8 + 1)
            .collect()
    }
}

/// Raw wire shape of a heartbeat response, per `spec.md` §6 and
/// `original_source/main/src/HTTPGameClient.c`'s `_ParseJsonResponseString`:
/// `stones`/`songs` travel as arrays of 1-based indices (ORed into
/// bitfields on receipt), not as bitfields themselves; a missing `event`
/// object means "not in an event".
#[derive(Debug, Clone, Deserialize)]
pub struct WireHeartbeatResponse {
    #[serde(default)]
    pub stones: Vec<i64>,
    #[serde(default)]
    pub songs: Vec<i64>,
    pub event: Option<WireEvent>,
    #[serde(rename = "serverResponseTime")]
    pub server_response_time: Option<WireServerTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireEvent {
    pub event: Option<String>,
    #[serde(rename = "stoneColor")]
    pub stone_color: Option<i64>,
    pub power: Option<f64>,
    #[serde(rename = "msRemaining")]
    pub ms_remaining: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireServerTime {
    pub tv_sec: i64,
    #[serde(default)]
    pub tv_nsec: i64,
}

/// Bit width of `song_unlocked_bits`; indices outside `1..=16` are dropped
/// rather than rejecting the whole response (matches the original's
/// per-index range check in `_ParseJsonResponseString`).
const MAX_SONG_BIT_INDEX: i64 = 16;

impl WireHeartbeatResponse {
    /// Converts the wire shape into the in-memory `HeartBeatResponse`,
    /// OR-ing `stones`/`songs` indices into bitfields per `spec.md` §6.
    /// Out-of-range indices are dropped, matching the original's `ESP_LOGE`
    /// + skip behavior rather than failing the whole parse.
    pub fn into_response(self) -> crate::heartbeat::HeartBeatResponse {
        let mut stone_bits: u8 = 0;
        for index in &self.stones {
            if *index > 0 && (*index as usize) <= crate::heartbeat::NUM_GAME_COLORS {
                stone_bits |= 1 << (*index - 1);
            }
        }

        let mut song_unlocked_bits: u16 = 0;
        for index in &self.songs {
            if *index > 0 && *index <= MAX_SONG_BIT_INDEX {
                song_unlocked_bits |= 1 << (*index - 1);
            }
        }

        let event = match self.event {
            Some(wire_event) => crate::heartbeat::GameEventData {
                event_id_b64: wire_event.event.unwrap_or_default(),
                color: wire_event
                    .stone_color
                    .map(|c| GameColor::from_index(c - 1))
                    .unwrap_or_default(),
                power_level: wire_event.power.unwrap_or(0.0) as u8,
                ms_remaining: wire_event.ms_remaining.unwrap_or(0),
            },
            None => crate::heartbeat::GameEventData::default(),
        };

        let server_time_unix_s = self
            .server_response_time
            .map(|t| t.tv_sec.max(0) as u64)
            .unwrap_or(0);

        crate::heartbeat::HeartBeatResponse {
            status: crate::heartbeat::GameStatusData {
                stone_bits,
                song_unlocked_bits,
            },
            event,
            server_time_unix_s,
        }
    }
}

/// Sets the system clock's offset from a measured request round trip,
/// adjusting the server's reported time by half the measured round-trip
/// time to estimate the time at which the server actually produced the
/// response.
pub fn adjust_server_time_for_rtt(server_time_unix_s: u64, rtt_ms: u32) -> u64 {
    server_time_unix_s + (rtt_ms / 2 / 1000) as u64
}

pub fn badge_type_wire_value(badge_type: BadgeType) -> u8 {
    badge_type as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(kind: RequestKind, send_at: Tick) -> QueuedRequest {
        QueuedRequest {
            method: Method::Post,
            kind,
            send_at,
            expire_at: send_at + 60_000,
            body: vec![],
        }
    }

    #[test]
    fn enqueue_dedups_by_method_and_kind() {
        let mut queue = RequestQueue::new();
        queue.enqueue(sample_request(RequestKind::Heartbeat, 1_000)).unwrap();
        queue.enqueue(sample_request(RequestKind::Heartbeat, 2_000)).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_send_at(), Some(2_000));
    }

    #[test]
    fn enqueue_rejects_when_full_and_distinct() {
        let mut queue = RequestQueue::new();
        queue.enqueue(sample_request(RequestKind::Heartbeat, 0)).unwrap();
        queue.enqueue(sample_request(RequestKind::OtaCheck, 0)).unwrap();
        queue.enqueue(sample_request(RequestKind::NetworkTest, 0)).unwrap();
        let err = queue
            .enqueue(QueuedRequest {
                method: Method::Get,
                kind: RequestKind::Heartbeat,
                send_at: 0,
                expire_at: 0,
                body: vec![],
            })
            .unwrap_err();
        assert_eq!(err, QueueError::Full);
    }

    #[test]
    fn expire_drops_only_past_deadline_items() {
        let mut queue = RequestQueue::new();
        queue.enqueue(sample_request(RequestKind::Heartbeat, 0)).unwrap();
        queue.expire(100_000);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_in_order_empties_queue_and_sorts_by_send_at() {
        let mut queue = RequestQueue::new();
        queue.enqueue(sample_request(RequestKind::OtaCheck, 5_000)).unwrap();
        queue.enqueue(sample_request(RequestKind::Heartbeat, 1_000)).unwrap();
        let drained = queue.drain_in_order();
        assert_eq!(drained[0].kind, RequestKind::Heartbeat);
        assert!(queue.is_empty());
    }

    #[test]
    fn song_indices_are_one_based() {
        let indices = HeartbeatBody::song_indices_from_bits(0b101);
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn wire_heartbeat_response_ors_stone_and_song_indices_into_bitfields() {
        let json = r#"{
            "stones": [1, 3],
            "songs": [1, 3],
            "event": {"event": "EBESExQVFhc=", "stoneColor": 2, "power": 2.0, "msRemaining": 9000},
            "serverResponseTime": {"tv_sec": 1700000000, "tv_nsec": 500000000}
        }"#;
        let wire: WireHeartbeatResponse = serde_json::from_str(json).unwrap();
        let response = wire.into_response();
        assert_eq!(response.status.stone_bits, 0b101);
        assert_eq!(response.status.song_unlocked_bits, 0b101);
        assert_eq!(response.event.event_id_b64, "EBESExQVFhc=");
        assert_eq!(response.event.color, GameColor::Yellow);
        assert_eq!(response.event.power_level, 2);
        assert_eq!(response.event.ms_remaining, 9000);
        assert_eq!(response.server_time_unix_s, 1_700_000_000);
    }

    #[test]
    fn wire_heartbeat_response_missing_event_is_blank() {
        let json = r#"{"stones": [], "songs": []}"#;
        let wire: WireHeartbeatResponse = serde_json::from_str(json).unwrap();
        let response = wire.into_response();
        assert!(response.event.is_blank());
    }

    #[test]
    fn out_of_range_stone_index_is_dropped() {
        let json = r#"{"stones": [0, 7, 2], "songs": []}"#;
        let wire: WireHeartbeatResponse = serde_json::from_str(json).unwrap();
        let response = wire.into_response();
        assert_eq!(response.status.stone_bits, 0b010);
    }

    #[test]
    fn heartbeat_body_serializes_with_fixed_field_order() {
        let body = HeartbeatBody {
            uuid: "id".into(),
            key: "key".into(),
            provision_key: PROVISION_KEY.into(),
            peer_report: vec![],
            enrolled_event: "".into(),
            badge_request_time: 0,
            badge_type: 1,
            songs: vec![],
            stats: WireStats::from_stats(&BadgeStats::default(), 80, 0),
        };
        let json = serde_json::to_string(&body).unwrap();
        let uuid_pos = json.find("\"uuid\"").unwrap();
        let key_pos = json.find("\"key\"").unwrap();
        let provision_pos = json.find("\"provisionKey\"").unwrap();
        assert!(uuid_pos < key_pos);
        assert!(key_pos < provision_pos);
    }
}
