//! Game state: event membership, status data and heartbeat scheduling.
//!
//! Grounded on `spec.md` §4.10 and `original_source/main/inc/GameTypes.h`'s
//! `GameStatusData`/`GameEventData` structs. The HTTP wire DTOs this module
//! assembles travel over [`crate::http`]; this module owns only the
//! in-memory state machine, kept hardware- and transport-agnostic so it can
//! be driven by a `FakeClock` in tests.

use serde::{Deserialize, Serialize};

use crate::identity::BadgeType;
use crate::peers::{PeerMap, PeerReport, SeenEventMap};
use crate::stats::BadgeStats;
use crate::time::Tick;

/// Heartbeat cadence while the badge is enrolled in an event.
pub const HEARTBEAT_INTERVAL_IN_EVENT_MS: u32 = 60_000;
/// Heartbeat cadence otherwise.
pub const HEARTBEAT_INTERVAL_IDLE_MS: u32 = 5 * 60_000;
/// Delay of the very first heartbeat after boot.
pub const FIRST_HEARTBEAT_DELAY_MS: u32 = 5_000;

/// The six stone/event colors, `spec.md` §3's `GameStatus.event.color`
/// enum. Wire order matches `original_source/main/inc/GameState.h`'s
/// `GameState_EventColor` (1-based on the wire, `stoneColor - 1` here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameColor {
    Red,
    Yellow,
    Green,
    Cyan,
    Blue,
    Magenta,
}

/// Number of distinct stone colors, `original_source`'s
/// `NUM_GAMESTATE_EVENTCOLORS`.
pub const NUM_GAME_COLORS: usize = 6;

impl GameColor {
    /// Maps a 0-based index (`stoneColor - 1` on the wire) to a color.
    /// Out-of-range indices fall back to `Red`, matching the original's
    /// unchecked enum cast rather than rejecting the whole response.
    pub fn from_index(index: i64) -> Self {
        match index {
            0 => GameColor::Red,
            1 => GameColor::Yellow,
            2 => GameColor::Green,
            3 => GameColor::Cyan,
            4 => GameColor::Blue,
            5 => GameColor::Magenta,
            _ => GameColor::Red,
        }
    }
}

impl Default for GameColor {
    /// Arbitrary placeholder used only while `event.event_id_b64` is blank,
    /// where `spec.md` leaves the color field meaningless.
    fn default() -> Self {
        GameColor::Red
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameEventData {
    pub event_id_b64: String,
    pub color: GameColor,
    pub power_level: u8,
    pub ms_remaining: u32,
}

impl GameEventData {
    /// True iff `event_id_b64` is empty or the base64 encoding of 8 zero
    /// bytes (`"AAAAAAAAAAA="`-shaped: all 'A' characters plus '=' padding),
    /// `spec.md` §3's "zeroed if not in event" sentinel.
    pub fn is_blank(&self) -> bool {
        self.event_id_b64.is_empty()
            || self.event_id_b64.chars().all(|c| c == 'A' || c == '=')
    }
}

/// `stone_bits` is one flag per `GameColor`, so `spec.md` §3 sizes it as a
/// `u8` (six flags fit); `song_unlocked_bits` covers up to 12 songs, sized
/// `u16`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStatusData {
    pub stone_bits: u8,
    pub song_unlocked_bits: u16,
}

/// Combined persisted game state, written to disk (battery-gated) whenever
/// the event changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStateData {
    pub status: GameStatusData,
    pub event: GameEventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartBeatRequest {
    pub state: GameStateData,
    pub stats: BadgeStats,
    pub peer_reports: Vec<PeerReport>,
    pub badge_id_b64: String,
    pub key_b64: String,
    pub wait_hint_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartBeatResponse {
    pub status: GameStatusData,
    pub event: GameEventData,
    /// Server unix-seconds timestamp at the moment it built the response,
    /// used by the caller to adjust the system clock by half the measured
    /// round-trip time.
    pub server_time_unix_s: u64,
}

/// Transition produced by applying a heartbeat response, for the caller to
/// turn into bus events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTransition {
    None,
    Joined,
    Ended,
}

pub struct GameStateEngine {
    state: GameStateData,
    peers: PeerMap,
    seen_events: SeenEventMap,
    next_heartbeat: Tick,
    send_immediately: bool,
    in_event: bool,
}

impl GameStateEngine {
    /// `initial_state` is whatever was last persisted to disk (or the
    /// default, on first boot), so `stone_bits`/`song_unlocked_bits`/the
    /// current event survive a reboot per `spec.md` §3's monotonic-unlock
    /// invariant.
    pub fn new(boot_tick: Tick, initial_state: GameStateData) -> Self {
        let in_event = !initial_state.event.is_blank();
        Self {
            state: initial_state,
            peers: PeerMap::new(),
            seen_events: SeenEventMap::new(),
            next_heartbeat: crate::time::future(boot_tick, FIRST_HEARTBEAT_DELAY_MS),
            send_immediately: false,
            in_event,
        }
    }

    pub fn state(&self) -> &GameStateData {
        &self.state
    }

    /// Applies one peer beacon observation, per `spec.md` §4.10: overwrite
    /// event id, raise RSSI only, insert-or-drop when unseen.
    pub fn observe_peer(
        &mut self,
        badge_id_b64: &str,
        event_id_b64: &str,
        rssi: i16,
        badge_type: BadgeType,
    ) {
        self.peers
            .observe(badge_id_b64, event_id_b64, rssi, badge_type);

        if self.seen_events.observe(event_id_b64) && !self.in_event {
            self.send_immediately = true;
        }
    }

    /// Called on `OcarinaSongMatched`. Returns `true` if the song was newly
    /// unlocked (caller should play the unlock song) and requests an
    /// immediate heartbeat in that case.
    pub fn observe_song_matched(&mut self, song_bit_index: usize) -> bool {
        if song_bit_index >= 16 {
            return false;
        }
        let mask = 1u16 << song_bit_index;
        if self.state.status.song_unlocked_bits & mask != 0 {
            return false;
        }
        self.state.status.song_unlocked_bits |= mask;
        self.send_immediately = true;
        true
    }

    /// True iff a heartbeat should be assembled and sent now.
    pub fn should_send_heartbeat(&self, now: Tick) -> bool {
        self.send_immediately || crate::time::expired(now, self.next_heartbeat)
    }

    /// Assembles a `HeartBeatRequest`, drains the peer map and reschedules
    /// the next heartbeat.
    pub fn assemble_heartbeat(
        &mut self,
        now: Tick,
        stats: BadgeStats,
        badge_id_b64: String,
        key_b64: String,
    ) -> HeartBeatRequest {
        let peer_reports = self.peers.drain();
        self.send_immediately = false;
        let interval = if self.in_event {
            HEARTBEAT_INTERVAL_IN_EVENT_MS
        } else {
            HEARTBEAT_INTERVAL_IDLE_MS
        };
        self.next_heartbeat = crate::time::future(now, interval);

        HeartBeatRequest {
            state: self.state.clone(),
            stats,
            peer_reports,
            badge_id_b64,
            key_b64,
            wait_hint_ms: interval,
        }
    }

    /// Applies a heartbeat response. Returns the event transition the
    /// caller should turn into a `GameEventJoined`/`GameEventEnded` event.
    pub fn apply_response(&mut self, now: Tick, response: &HeartBeatResponse) -> EventTransition {
        let mut transition = EventTransition::None;

        if response.status != self.state.status {
            self.state.status = response.status.clone();
        }

        if response.event.event_id_b64 != self.state.event.event_id_b64 {
            if !response.event.is_blank() {
                self.in_event = true;
                transition = EventTransition::Joined;
            } else {
                self.in_event = false;
                transition = EventTransition::Ended;
            }
            self.state.event = response.event.clone();
            // Reschedule so a just-joined event's shorter cadence applies to
            // the very next heartbeat instead of waiting out the old idle
            // interval.
            let interval = if self.in_event {
                HEARTBEAT_INTERVAL_IN_EVENT_MS
            } else {
                HEARTBEAT_INTERVAL_IDLE_MS
            };
            self.next_heartbeat = crate::time::future(now, interval);
        } else {
            self.state.event = response.event.clone();
        }

        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_heartbeat_is_scheduled_five_seconds_after_boot() {
        let engine = GameStateEngine::new(0, GameStateData::default());
        assert!(!engine.should_send_heartbeat(4_999));
        assert!(engine.should_send_heartbeat(5_000));
    }

    #[test]
    fn new_event_id_triggers_immediate_heartbeat_when_not_in_event() {
        let mut engine = GameStateEngine::new(0, GameStateData::default());
        engine.observe_peer("AQIDBAUGBwg=", "EBESExQVFhc=", -40, BadgeType::Reactor);
        assert!(engine.should_send_heartbeat(0));
    }

    #[test]
    fn assembling_heartbeat_drains_peers_and_clears_immediate_flag() {
        let mut engine = GameStateEngine::new(0, GameStateData::default());
        engine.observe_peer("AQIDBAUGBwg=", "EBESExQVFhc=", -40, BadgeType::Reactor);
        let req = engine.assemble_heartbeat(0, BadgeStats::default(), "id".into(), "key".into());
        assert_eq!(req.peer_reports.len(), 1);
        assert!(!engine.should_send_heartbeat(0));
    }

    #[test]
    fn response_with_new_event_id_emits_joined() {
        let mut engine = GameStateEngine::new(0, GameStateData::default());
        let response = HeartBeatResponse {
            status: GameStatusData::default(),
            event: GameEventData {
                event_id_b64: "EBESExQVFhc=".into(),
                color: GameColor::Blue,
                power_level: 2,
                ms_remaining: 10_000,
            },
            server_time_unix_s: 1_700_000_000,
        };
        let transition = engine.apply_response(0, &response);
        assert_eq!(transition, EventTransition::Joined);
        assert_eq!(engine.state().event.event_id_b64, "EBESExQVFhc=");
    }

    #[test]
    fn response_clearing_event_id_emits_ended() {
        let mut engine = GameStateEngine::new(0, GameStateData::default());
        let joined = HeartBeatResponse {
            status: GameStatusData::default(),
            event: GameEventData {
                event_id_b64: "EBESExQVFhc=".into(),
                color: GameColor::Blue,
                power_level: 2,
                ms_remaining: 10_000,
            },
            server_time_unix_s: 0,
        };
        engine.apply_response(0, &joined);

        let ended = HeartBeatResponse {
            status: GameStatusData::default(),
            event: GameEventData::default(),
            server_time_unix_s: 0,
        };
        let transition = engine.apply_response(1_000, &ended);
        assert_eq!(transition, EventTransition::Ended);
    }

    #[test]
    fn unlocking_already_unlocked_song_is_a_no_op() {
        let mut engine = GameStateEngine::new(0, GameStateData::default());
        assert!(engine.observe_song_matched(3));
        assert!(!engine.observe_song_matched(3));
    }
}
