//! Game-state task: peer/heartbeat aggregation and response application.
//!
//! Grounded on `spec.md` §4.10 and `badge_core::heartbeat::GameStateEngine`,
//! which owns the actual state machine; this module is the `firmware`-crate
//! glue that (a) feeds `PeerHeartbeatDetected`/`OcarinaSongMatched` bus
//! events into it, (b) polls it every 100 ms per `spec.md` §5's "Game state"
//! task row, and (c) turns an assembled `HeartBeatRequest` into a queued
//! HTTP POST body the way `firmware/src/request.rs` builds its JSON bodies.
//! Mirrors the teacher's actor-owned-state recommendation in `spec.md` §9:
//! the peer map lives inside this task, reached only through bus events, not
//! a shared mutex.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use badge_core::battery::BatterySensor;
use badge_core::event::Event;
use badge_core::heartbeat::{EventTransition, GameStateData, GameStateEngine, HeartBeatResponse};
use badge_core::http::{
    badge_type_wire_value, HeartbeatBody, Method, QueuedRequest, RequestKind, RequestQueue, WireStats, PROVISION_KEY,
};
use badge_core::identity::{BadgeId, BadgeType, Key};
use badge_core::songs::Song;
use badge_core::stats::BadgeStats;
use badge_core::store::Store;
use badge_core::time::WallClock;
use badge_core::Bus;
use esp_idf_hal::delay::FreeRtos;
use log::*;

pub struct GameTask {
    engine: Mutex<GameStateEngine>,
    game_state_store: Arc<Store<GameStateData>>,
    battery: Arc<BatterySensor>,
    wall_clock: Arc<WallClock>,
    badge_id_b64: String,
    key_b64: String,
}

impl GameTask {
    /// `game_state_store` seeds the engine with whatever was last persisted,
    /// so `stone_bits`/`song_unlocked_bits`/the current event survive a
    /// reboot (`spec.md` §3's monotonic-unlock invariant). `wall_clock` is
    /// synced elsewhere (the Wi-Fi/HTTP dispatch thread) from each
    /// heartbeat response's server timestamp.
    pub fn new(
        boot_tick: badge_core::time::Tick,
        badge_id: BadgeId,
        key: Key,
        game_state_store: Arc<Store<GameStateData>>,
        battery: Arc<BatterySensor>,
        wall_clock: Arc<WallClock>,
    ) -> Arc<Self> {
        let initial_state = game_state_store.get();
        Arc::new(Self {
            engine: Mutex::new(GameStateEngine::new(boot_tick, initial_state)),
            game_state_store,
            battery,
            wall_clock,
            badge_id_b64: badge_id.to_base64(),
            key_b64: key.to_base64(),
        })
    }

    /// Registers this task's bus subscriptions. Must be called before
    /// `Bus::start()`, same as every other subscriber in `main.rs`.
    pub fn subscribe(self: &Arc<Self>, bus: &Bus) {
        let this = self.clone();
        let bus_clone = bus.clone();
        bus.subscribe(badge_core::EventKind::PeerHeartbeatDetected, move |event| {
            if let Event::PeerHeartbeatDetected { badge_id_b64, event_id_b64, peak_rssi, badge_type } = event {
                this.engine
                    .lock()
                    .unwrap()
                    .observe_peer(badge_id_b64, event_id_b64, *peak_rssi, *badge_type);
                let _ = bus_clone.notify(Event::SendHeartbeat, Duration::from_millis(50));
            }
        });

        let this = self.clone();
        let bus_clone = bus.clone();
        bus.subscribe(badge_core::EventKind::OcarinaSongMatched, move |event| {
            if let Event::OcarinaSongMatched(song_index) = event {
                let newly_unlocked = this.engine.lock().unwrap().observe_song_matched(*song_index);
                if newly_unlocked {
                    this.sync_game_state_store();
                    let _ = bus_clone.notify(Event::PlaySong(Song::SecretSound), Duration::from_millis(50));
                    let _ = bus_clone.notify(Event::SendHeartbeat, Duration::from_millis(50));
                }
            }
        });

        let this = self.clone();
        let bus_clone = bus.clone();
        bus.subscribe(badge_core::EventKind::WifiHeartbeatResponseReceived, move |event| {
            if let Event::WifiHeartbeatResponseReceived(response) = event {
                this.apply_response(response, &bus_clone);
            }
        });
    }

    fn apply_response(&self, response: &HeartBeatResponse, bus: &Bus) {
        let now = crate::now_ms();
        let transition = self.engine.lock().unwrap().apply_response(now, response);
        self.sync_game_state_store();
        match transition {
            EventTransition::Joined => {
                let _ = bus.notify(Event::GameEventJoined, Duration::from_millis(50));
            }
            EventTransition::Ended => {
                let _ = bus.notify(Event::GameEventEnded, Duration::from_millis(50));
            }
            EventTransition::None => {}
        }
    }

    /// Copies the engine's current state into the backing store and marks
    /// it dirty, so the periodic flush task picks it up (battery-gated,
    /// `spec.md` §4.10).
    fn sync_game_state_store(&self) {
        let state = self.engine.lock().unwrap().state().clone();
        self.game_state_store.update(|s| {
            let changed = *s != state;
            *s = state.clone();
            changed
        });
    }

    /// Run on its own thread, polling every 100 ms per `spec.md` §5's "Game
    /// state" task row. Enqueues a heartbeat HTTP POST whenever the engine
    /// says one is due, deduped by `RequestKind::Heartbeat` (a still-queued
    /// heartbeat simply gets its body/timing refreshed, per `spec.md` §4.11).
    pub fn run(self: Arc<Self>, stats: Arc<Store<BadgeStats>>, http_queue: Arc<Mutex<RequestQueue>>) -> ! {
        loop {
            let now = crate::now_ms();
            let due = self.engine.lock().unwrap().should_send_heartbeat(now);
            if due {
                let request = self.assemble_heartbeat_request(now, &stats);
                if let Err(e) = http_queue.lock().unwrap().enqueue(request) {
                    warn!("failed to queue heartbeat: {:?}", e);
                }
            }
            FreeRtos::delay_ms(100);
        }
    }

    fn assemble_heartbeat_request(&self, now: badge_core::time::Tick, stats: &Store<BadgeStats>) -> QueuedRequest {
        let stats_snapshot = stats.get();
        let heartbeat = self.engine.lock().unwrap().assemble_heartbeat(
            now,
            stats_snapshot,
            self.badge_id_b64.clone(),
            self.key_b64.clone(),
        );

        let body = HeartbeatBody {
            uuid: heartbeat.badge_id_b64.clone(),
            key: heartbeat.key_b64.clone(),
            provision_key: PROVISION_KEY.to_string(),
            peer_report: heartbeat
                .peer_reports
                .iter()
                .map(|r| badge_core::http::WirePeerReport {
                    uuid: r.badge_id_b64.clone(),
                    peak_rssi: r.peak_rssi,
                    event_uuid: r.event_id_b64.clone(),
                })
                .collect(),
            enrolled_event: heartbeat.state.event.event_id_b64.clone(),
            badge_request_time: now,
            badge_type: badge_type_wire_value(BadgeType::Reactor),
            songs: HeartbeatBody::song_indices_from_bits(heartbeat.state.status.song_unlocked_bits),
            stats: WireStats::from_stats(
                &heartbeat.stats,
                self.battery.percent().max(0) as u8,
                self.wall_clock.unix_seconds(now),
            ),
        };

        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        QueuedRequest {
            method: Method::Post,
            kind: RequestKind::Heartbeat,
            send_at: now,
            expire_at: now + heartbeat.wait_hint_ms,
            body: bytes,
        }
    }
}
