#![deny(warnings)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use badge_core::event::{Event, EventKind};
use badge_core::hal::Storage as _;
use badge_core::http::{Method, QueuedRequest, RequestKind, RequestQueue};
use badge_core::identity::{BadgeId, Key};
use badge_core::led::modes::STRIP_LEN;
use badge_core::led::pipeline::RenderPipeline;
use badge_core::settings::SettingsUpdate;
use badge_core::stats::BadgeStats;
use badge_core::store::Store;
use badge_core::touch::{TouchClassifier, NUM_ELECTRODES};
use badge_core::touch_actions::{reactor_pattern_table, GestureMatcher};
use badge_core::{firstboot, settings::UserSettings, wifi::DEFAULT_MAX_RETRIES};
use badge_core::Bus;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::PinDriver;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::*;

mod battery_monitor;
mod ble_service;
mod buzzer;
mod coordinator_task;
mod game_task;
mod http_transport;
mod led_strip;
mod ota;
mod storage;
mod synth_task;
mod touch_sensor;
mod vibrator;
mod wifi_driver;

use coordinator_task::CoordinatorTask;
use game_task::GameTask;
use synth_task::SynthTask;

/// Hardware touch-pad wiring for this board revision; mirrors the
/// original firmware's per-badge-type `TOUCH_BUTTON_MAP`.
const TOUCH_PAD_MAP: [esp_idf_sys::touch_pad_t; NUM_ELECTRODES] = [0, 2, 3, 4, 5, 6, 7, 8, 9];

/// Matches `OtaUpdate.c`'s `OTA_CHECK_DELAY_MS` (one hour), the "OTA update"
/// row in spec.md §5's task-priority table.
const OTA_CHECK_INTERVAL_MS: badge_core::time::Tick = 60 * 60 * 1000;

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();
    info!("badge firmware starting");

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut storage = storage::EspNvsStorage::new(nvs_partition)?;
    let is_first_boot = firstboot::check_and_consume(&mut storage)?;

    let mac = mac_address()?;
    let badge_id = BadgeId::from_mac(&mac);
    let badge_key = Key::from_mac(&mac);
    info!("badge id: {}", badge_id.to_base64());

    let settings = Arc::new(Store::<UserSettings>::load(&storage, "settings"));
    let stats = Arc::new(Store::<BadgeStats>::load(&storage, "stats"));
    let game_state_store = Arc::new(Store::<badge_core::heartbeat::GameStateData>::load(&storage, "game_state"));
    let wall_clock = Arc::new(badge_core::time::WallClock::new());
    if is_first_boot {
        stats.update(|s| {
            s.record_power_on();
            true
        });
    }

    let bus = Bus::new();
    bus.start();
    if is_first_boot {
        let _ = bus.notify(Event::FirstTimePowerOn, Duration::from_millis(50));
    }

    let pipeline = Arc::new(Mutex::new(RenderPipeline::new()));
    let http_queue = Arc::new(Mutex::new(RequestQueue::new()));
    let vibration_pin = PinDriver::output(peripherals.pins.gpio25.into())?;

    // ── Synth/song engine + ocarina matcher (spec.md §4.14/§4.15) ────────
    let synth = {
        let timer_driver: &'static _ = Box::leak(Box::new(esp_idf_hal::ledc::LedcTimerDriver::new(
            peripherals.ledc.timer0,
            &esp_idf_hal::ledc::config::TimerConfig::new().frequency(esp_idf_hal::units::Hertz(440)),
        )?));
        let pwm_driver =
            esp_idf_hal::ledc::LedcDriver::new(peripherals.ledc.channel0, timer_driver, peripherals.pins.gpio26)?;
        let synth = SynthTask::new(Box::new(buzzer::PwmBuzzer::new(pwm_driver)), pipeline.clone(), bus.clone());
        synth.subscribe(&bus);
        {
            let synth = synth.clone();
            std::thread::Builder::new().name("synth".into()).stack_size(4096).spawn(move || synth.run())?;
        }
        synth
    };

    let coordinator = CoordinatorTask::new(
        pipeline.clone(),
        Box::new(vibrator::GpioVibrator::new(vibration_pin)),
        http_queue.clone(),
        bus.clone(),
        synth,
    );

    // ── LED render task: highest-priority periodic task after BLE ────
    {
        let strip_driver =
            ws2812_esp32_rmt_driver::Ws2812Esp32Rmt::new(peripherals.rmt.channel0, peripherals.pins.gpio27)?;
        let mut strip = led_strip::Ws2812Strip::new(strip_driver, STRIP_LEN);
        let pipeline = pipeline.clone();
        std::thread::Builder::new()
            .name("led-render".into())
            .stack_size(8192)
            .spawn(move || loop {
                let now = now_ms();
                if let Err(e) = pipeline.lock().unwrap().tick(now, &mut strip) {
                    warn!("LED render tick failed: {:?}", e);
                }
                FreeRtos::delay_ms(badge_core::led::pipeline::RENDER_TICK_MS);
            })?;
    }

    // ── Touch sampling task: classifies raw electrode readings, then
    // feeds the same stream through the gesture matcher so long-press
    // chords become `TouchActionCommand`s (spec.md §4.8) ────────────────
    {
        let touch_sensor = touch_sensor::TouchSensor::new(TOUCH_PAD_MAP)?;
        let bus = bus.clone();
        let stats = stats.clone();
        let coordinator = coordinator.clone();
        std::thread::Builder::new()
            .name("touch-sample".into())
            .stack_size(4096)
            .spawn(move || {
                let mut classifier = TouchClassifier::new();
                let mut matcher = GestureMatcher::new(reactor_pattern_table());
                loop {
                    if coordinator.touch_enabled() {
                        let now = now_ms();
                        match touch_sensor.read_raw() {
                            Ok(raw) => {
                                for (electrode, value) in raw.iter().enumerate() {
                                    if let Some(state) = classifier.sample(electrode, now, *value) {
                                        stats.update(|s| {
                                            s.record_touch();
                                            true
                                        });
                                        let _ = bus.notify(
                                            Event::TouchSense { electrode, state },
                                            Duration::from_millis(50),
                                        );
                                        if let Some(command) = matcher.update(electrode, state) {
                                            stats.update(|s| {
                                                s.record_touch_command();
                                                true
                                            });
                                            let _ = bus.notify(
                                                Event::TouchActionCommand(command),
                                                Duration::from_millis(50),
                                            );
                                        }
                                    }
                                }
                            }
                            Err(e) => warn!("touch read failed: {:?}", e),
                        }
                    }
                    FreeRtos::delay_ms(badge_core::touch::SAMPLE_PERIOD_MS);
                }
            })?;
    }

    // ── Battery sensor task ──────────────────────────────────────────
    let battery = Arc::new(badge_core::battery::BatterySensor::new());
    {
        let adc = esp_idf_hal::adc::oneshot::AdcDriver::new(peripherals.adc1)?;
        let mut monitor = battery_monitor::AdcBatteryMonitor::new(adc, peripherals.pins.gpio34)?;
        let battery = battery.clone();
        let stats = stats.clone();
        std::thread::Builder::new()
            .name("battery-sense".into())
            .stack_size(4096)
            .spawn(move || loop {
                match monitor.voltage_mv() {
                    Ok(mv) => {
                        battery.update(battery_monitor::mv_to_percent(mv));
                        stats.update(|s| {
                            s.record_battery_check();
                            true
                        });
                    }
                    Err(e) => warn!("battery read failed: {:?}", e),
                }
                FreeRtos::delay_ms(badge_core::battery::SAMPLE_PERIOD_MS);
            })?;
    }

    // ── Settings/stats/game-state flush task ──────────────────────────
    {
        let settings = settings.clone();
        let stats = stats.clone();
        let game_state_store = game_state_store.clone();
        let battery = battery.clone();
        std::thread::Builder::new()
            .name("flush".into())
            .stack_size(4096)
            .spawn(move || {
                let mut storage = storage;
                let mut ticks = 0u64;
                loop {
                    FreeRtos::delay_ms(60_000);
                    ticks += 1;
                    let battery_mv = battery.percent().max(0) as u16 * 10;
                    let _ = settings.flush(&mut storage, battery_mv);
                    let _ = game_state_store.flush(&mut storage, battery_mv);
                    if ticks % 15 == 0 {
                        let _ = stats.flush(&mut storage, battery_mv);
                    }
                }
            })?;
    }

    // ── Wi-Fi + HTTP game client: connects once, then dispatches
    // whatever `RequestQueue` the coordinator/game-state tasks enqueue ──
    {
        let wifi = BlockingWifi::wrap(EspWifi::new(peripherals.modem, sys_loop.clone(), None)?, sys_loop)?;
        let mut driver = wifi_driver::WifiDriver::new(wifi, DEFAULT_MAX_RETRIES);
        let settings = settings.clone();
        let http_queue = http_queue.clone();
        let bus = bus.clone();
        let coordinator = coordinator.clone();
        let wall_clock = wall_clock.clone();
        std::thread::Builder::new()
            .name("wifi-http".into())
            .stack_size(8192)
            .spawn(move || {
                let creds = settings.get().wifi;
                if creds.ssid.is_empty() {
                    return;
                }
                if let Err(e) = driver.connect(&creds.ssid, &creds.password) {
                    warn!("wifi connect failed: {:?}", e);
                    return;
                }
                let _ = bus.notify(Event::WifiUp, Duration::from_millis(50));

                let mut transport = match http_transport::EspHttpTransport::new() {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("http transport init failed: {:?}", e);
                        return;
                    }
                };

                let mut next_ota_check = now_ms() + badge_core::http::WIFI_TIMEOUT_MS;
                loop {
                    let now = now_ms();
                    if now >= next_ota_check {
                        next_ota_check = now + OTA_CHECK_INTERVAL_MS;
                        let request = QueuedRequest {
                            method: Method::Get,
                            kind: RequestKind::OtaCheck,
                            send_at: now,
                            expire_at: now + badge_core::http::WIFI_TIMEOUT_MS + badge_core::http::HTTP_TIMEOUT_MS,
                            body: Vec::new(),
                        };
                        if let Err(e) = http_queue.lock().unwrap().enqueue(request) {
                            warn!("failed to queue OTA check: {:?}", e);
                        }
                    }

                    let ready = {
                        let mut queue = http_queue.lock().unwrap();
                        queue.expire(now);
                        !queue.is_empty()
                    };
                    if ready {
                        let drained = http_queue.lock().unwrap().drain_in_order();
                        for request in drained {
                            dispatch_request(&mut transport, &bus, &coordinator, &wall_clock, request);
                        }
                    }
                    FreeRtos::delay_ms(100);
                }
            })?;
    }

    // ── Peer discovery: the scan loop only parses and republishes;
    // `GameTask` owns the peer map (spec.md §4.10) ───────────────────────
    {
        let bus = bus.clone();
        std::thread::Builder::new()
            .name("ble-scan".into())
            .stack_size(8192)
            .spawn(move || ble_service::run_scan_loop(bus))?;
    }

    // ── BLE peripheral service (runs its callbacks off the NimBLE host
    // thread, so no dedicated thread is spawned here) ──────────────────
    let ble_peripheral = ble_service::BlePeripheral::start("Badge", bus.clone())?;
    let _ble_peripheral = ble_peripheral;

    // ── Game state: peer/heartbeat aggregation (spec.md §4.10/§4.11) ────
    {
        let game = GameTask::new(
            now_ms(),
            badge_id,
            badge_key,
            game_state_store.clone(),
            battery.clone(),
            wall_clock.clone(),
        );
        game.subscribe(&bus);
        let stats = stats.clone();
        let http_queue = http_queue.clone();
        std::thread::Builder::new()
            .name("game-state".into())
            .stack_size(8192)
            .spawn(move || game.run(stats, http_queue))?;
    }

    // ── BLE-received settings feed into the settings JSON update path
    // (spec.md §4.3's partial-update rule) ──────────────────────────────
    {
        let settings = settings.clone();
        let stats = stats.clone();
        let bus_clone = bus.clone();
        bus.subscribe(badge_core::EventKind::FileReceivedSettings, move |event| {
            if let badge_core::Event::FileReceivedSettings(bytes) = event {
                match serde_json::from_slice::<SettingsUpdate>(bytes) {
                    Ok(update) => {
                        let mut applied = true;
                        settings.update(|s| match s.apply_update(&update) {
                            Ok(()) => true,
                            Err(e) => {
                                warn!("settings update rejected: {:?}", e);
                                applied = false;
                                false
                            }
                        });
                        stats.update(|s| {
                            s.record_ble_settings_transfer();
                            true
                        });
                        let event = if applied {
                            badge_core::Event::FileTransferComplete(badge_core::event::FileType::Settings)
                        } else {
                            badge_core::Event::FileTransferFailed
                        };
                        let _ = bus_clone.notify(event, Duration::from_millis(50));
                    }
                    Err(e) => {
                        warn!("malformed settings JSON: {:?}", e);
                        let _ = bus_clone.notify(badge_core::Event::FileTransferFailed, Duration::from_millis(50));
                    }
                }
            }
        });
    }

    // ── BLE-received LED sequences feed straight into the coordinator's
    // cached sequence, so a later `SetLedMode(Sequence)` effect has data
    // to render ──────────────────────────────────────────────────────────
    {
        let coordinator = coordinator.clone();
        bus.subscribe(EventKind::FileReceivedLed, move |event| {
            if let Event::FileReceivedLed(bytes) = event {
                coordinator.set_last_led_sequence(bytes.clone());
            }
        });
    }

    // ── System coordinator: reacts to touch commands by re-arbitrating
    // the LED mode and applying every other effect (spec.md §4.7) ──────
    {
        let coordinator = coordinator.clone();
        bus.subscribe(EventKind::TouchActionCommand, move |event| {
            if let Event::TouchActionCommand(command) = event {
                coordinator.handle_touch_command(*command, now_ms());
            }
        });
    }

    info!("badge firmware initialized, entering idle loop");
    loop {
        FreeRtos::delay_ms(1000);
    }
}

/// Sends one dequeued request and republishes its outcome on the bus, per
/// `spec.md` §4.11's request/response event pairs.
fn dispatch_request(
    transport: &mut http_transport::EspHttpTransport,
    bus: &Bus,
    coordinator: &Arc<CoordinatorTask>,
    wall_clock: &badge_core::time::WallClock,
    request: QueuedRequest,
) {
    use badge_core::hal::{HttpMethod, HttpTransport as _};

    let method = match request.method {
        Method::Get => HttpMethod::Get,
        Method::Post => HttpMethod::Post,
    };
    let body = if request.body.is_empty() { None } else { Some(request.body.as_slice()) };
    match transport.request(method, "https://badge.example.invalid/api", body, Duration::from_millis(
        badge_core::http::HTTP_TIMEOUT_MS as u64,
    )) {
        Ok(response) => match request.kind {
            RequestKind::NetworkTest => {
                let passed = (200..300).contains(&response.status);
                let _ = bus.notify(Event::NetworkTestComplete(passed), Duration::from_millis(50));
            }
            RequestKind::OtaCheck => {
                let needs_update = (200..300).contains(&response.status);
                if needs_update {
                    let _ = bus.notify(Event::OtaRequired, Duration::from_millis(50));
                    ota::perform_ota(transport, bus, coordinator, now_ms());
                }
            }
            RequestKind::Heartbeat => {
                match serde_json::from_slice::<badge_core::http::WireHeartbeatResponse>(&response.body) {
                    Ok(wire) => {
                        let rtt_ms = now_ms().wrapping_sub(request.send_at);
                        let mut parsed = wire.into_response();
                        parsed.server_time_unix_s =
                            badge_core::http::adjust_server_time_for_rtt(parsed.server_time_unix_s, rtt_ms);
                        wall_clock.sync(now_ms(), parsed.server_time_unix_s);
                        let _ = bus.notify(Event::WifiHeartbeatResponseReceived(parsed), Duration::from_millis(50));
                    }
                    Err(e) => warn!("failed to decode heartbeat response: {:?}", e),
                }
            }
        },
        Err(e) => {
            warn!("http request failed: {:?}", e);
            if request.kind == RequestKind::NetworkTest {
                let _ = bus.notify(Event::NetworkTestComplete(false), Duration::from_millis(50));
            }
        }
    }
}

fn clock() -> &'static badge_core::time::SystemClock {
    use std::sync::OnceLock;
    static CLOCK: OnceLock<badge_core::time::SystemClock> = OnceLock::new();
    CLOCK.get_or_init(badge_core::time::SystemClock::new)
}

pub(crate) fn now_ms() -> badge_core::time::Tick {
    use badge_core::time::Clock;
    clock().now_ms()
}

fn mac_address() -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    unsafe {
        esp_idf_sys::esp!(esp_idf_sys::esp_read_mac(
            mac.as_mut_ptr(),
            esp_idf_sys::esp_mac_type_t_ESP_MAC_WIFI_STA,
        ))?;
    }
    Ok(mac)
}
