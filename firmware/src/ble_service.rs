//! BLE peripheral service (file-transfer + interactive-game characteristics)
//! and passive peer-beacon scanning.
//!
//! Grounded on the teacher's `bluetooth.rs`/`bluetooth/` (GATT service
//! setup, `on_connect`/`on_disconnect`/`on_write` via `esp32-nimble`) and
//! on the pack's `dougborg-AirHound` firmware for the scan-thread idiom
//! (`BLEScan::new().active_scan(..)`, `block_on(scan.start(..))`). The
//! protocol itself — frame reassembly, interactive-game bits, peer beacon
//! parsing — is `badge_core::ble`; this module only turns GATT callbacks
//! into calls on that logic and notification-bus events.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use badge_core::ble::{
    self, parse_peer_beacon, ConfigOutcome, DataOutcome, FrameContext, InteractiveGameBits,
};
use badge_core::event::{Event, FileType};
use badge_core::Bus;
use esp32_nimble::utilities::mutex::Mutex as NimbleMutex;
use esp32_nimble::{uuid128, BLEAdvertisementData, BLECharacteristic, BLEDevice, BLEScan, NimbleProperties};
use esp_idf_hal::task::block_on;
use log::*;

pub const SERVICE_UUID_BASE: &str = "0000f00d-0000-1000-8000-0013381337ee";
pub const FILE_TRANSFER_CHARACTERISTIC_UUID: &str = "0000f00d-0001-1000-8000-0013381337ee";
pub const INTERACTIVE_GAME_CHARACTERISTIC_UUID: &str = "0000f00d-0002-1000-8000-0013381337ee";

const CONFIG_FRAME_SIZE: usize = ble::frame_transfer::CONFIG_FRAME_HEADER_SIZE;

pub struct BlePeripheral {
    frame_context: Arc<Mutex<FrameContext>>,
    game_bits: Arc<NimbleMutex<InteractiveGameBits>>,
}

impl BlePeripheral {
    /// Mirrors the teacher's `setup_runtime`: takes the singleton
    /// `BLEDevice`, builds one service with the two characteristics this
    /// badge needs, and wires their `on_write`/`on_connect`/`on_disconnect`
    /// callbacks to `bus`.
    pub fn start(device_name: &str, bus: Bus) -> anyhow::Result<Self> {
        let frame_context = Arc::new(Mutex::new(FrameContext::new()));
        let game_bits = Arc::new(NimbleMutex::new(InteractiveGameBits::new()));

        let ble_device = BLEDevice::take();
        let advertiser = ble_device.get_advertising();
        let server = ble_device.get_server();

        {
            let bus = bus.clone();
            server.on_connect(move |server, desc| {
                if let Err(e) = server.update_conn_params(desc.conn_handle(), 24, 48, 0, 60) {
                    warn!("failed to update BLE connection params: {:?}", e);
                }
                let _ = bus.notify(Event::BleConnected, Duration::from_millis(50));
            });
        }

        let service = server.create_service(uuid128!(SERVICE_UUID_BASE));

        let file_transfer_characteristic = service.lock().create_characteristic(
            uuid128!(FILE_TRANSFER_CHARACTERISTIC_UUID),
            NimbleProperties::READ | NimbleProperties::WRITE | NimbleProperties::NOTIFY,
        );

        let game_characteristic = service.lock().create_characteristic(
            uuid128!(INTERACTIVE_GAME_CHARACTERISTIC_UUID),
            NimbleProperties::READ | NimbleProperties::WRITE | NimbleProperties::NOTIFY,
        );

        {
            let characteristic = file_transfer_characteristic.clone();
            let bus = bus.clone();
            server.on_disconnect(move |_desc, _reason| {
                let _ = characteristic.lock().set_value(&[]);
                let _ = bus.notify(Event::BleDisconnected, Duration::from_millis(50));
            });
        }

        {
            let frame_context = frame_context.clone();
            let bus = bus.clone();
            file_transfer_characteristic
                .lock()
                .on_write(move |args| {
                    let data = args.recv_data();
                    handle_file_transfer_write(&frame_context, &bus, data);
                });
        }

        {
            let game_bits = game_bits.clone();
            let bus = bus.clone();
            game_characteristic.lock().on_write(move |args| {
                let data = args.recv_data();
                if data.len() == 2 {
                    let raw = u16::from_le_bytes([data[0], data[1]]);
                    *game_bits.lock() = InteractiveGameBits::from_raw(raw);
                    let _ = bus.notify(Event::InteractiveGameAction(raw), Duration::from_millis(50));
                }
            });
        }

        advertiser
            .lock()
            .set_data(BLEAdvertisementData::new().name(device_name).add_service_uuid(uuid128!(SERVICE_UUID_BASE)))?;
        advertiser.lock().start()?;

        Ok(Self {
            frame_context,
            game_bits,
        })
    }

    pub fn game_bits(&self) -> InteractiveGameBits {
        *self.game_bits.lock()
    }
}

fn handle_file_transfer_write(frame_context: &Arc<Mutex<FrameContext>>, bus: &Bus, data: &[u8]) {
    let Ok(mut ctx) = frame_context.lock() else {
        error!("frame context mutex poisoned, dropping BLE write");
        return;
    };

    if data.len() == CONFIG_FRAME_SIZE {
        let mut header = [0u8; CONFIG_FRAME_SIZE];
        header.copy_from_slice(data);
        match ctx.accept_config_frame(&header) {
            Ok(ConfigOutcome::TransferStarted { .. }) | Ok(ConfigOutcome::PairingProbe { .. }) => {}
            Err(e) => {
                warn!("rejected BLE config frame: {:?}", e);
                let _ = bus.notify(Event::FileTransferFailed, Duration::from_millis(50));
            }
        }
        return;
    }

    match ctx.accept_data_frame(data) {
        Ok(DataOutcome::Percent(percent)) => {
            let _ = bus.notify(Event::FileTransferPercent(percent), Duration::from_millis(50));
        }
        Ok(DataOutcome::Complete { file_type, bytes, .. }) => {
            let event = match file_type {
                FileType::Led => Event::FileReceivedLed(bytes),
                FileType::Settings => Event::FileReceivedSettings(bytes),
                FileType::Test => Event::FileReceivedTest(bytes),
            };
            let _ = bus.notify(event, Duration::from_millis(50));
            ctx.reset();
        }
        Err(e) => {
            warn!("rejected BLE data frame: {:?}", e);
            let _ = bus.notify(Event::FileTransferFailed, Duration::from_millis(50));
            ctx.reset();
        }
    }
}

/// Passive peer-beacon scan loop, grounded on the pack's
/// `BLEScan::new().active_scan(false)` / `block_on(scan.start(..))` idiom.
/// Runs forever in 5-second rounds on its own thread. Per `spec.md` §4.10's
/// ownership note ("populated by the BLE observer via the bus"), this loop
/// only parses and republishes; [`crate::game_task::GameTask`] is the sole
/// owner of the peer map, reached exclusively through `PeerHeartbeatDetected`
/// events — not a shared mutex.
pub fn run_scan_loop(bus: Bus) -> ! {
    let ble_device = BLEDevice::take();
    let mut scan = BLEScan::new();
    scan.active_scan(false).interval(100).window(99);

    loop {
        let _ = block_on(scan.start(ble_device, 5_000, |device, data| {
            if let Some(mfg_data) = extract_manufacturer_data(data.payload()) {
                if let Some(report) = parse_peer_beacon(mfg_data, device.rssi()) {
                    let _ = bus.notify(
                        Event::PeerHeartbeatDetected {
                            badge_id_b64: report.badge_id_b64,
                            event_id_b64: report.event_id_b64,
                            peak_rssi: report.peak_rssi,
                            badge_type: report.badge_type,
                        },
                        Duration::from_millis(50),
                    );
                }
            }
            None::<()>
        }));
    }
}

/// Walks the raw advertisement TLV structure for the AD type `0xFF`
/// (manufacturer-specific data) record, the same walk as the pack's
/// `BleAdvParser::parse` loop.
fn extract_manufacturer_data(ad_data: &[u8]) -> Option<&[u8]> {
    let mut pos = 0;
    while pos < ad_data.len() {
        let len = ad_data[pos] as usize;
        if len == 0 || pos + 1 + len > ad_data.len() {
            break;
        }
        let ad_type = ad_data[pos + 1];
        let data = &ad_data[pos + 2..pos + 1 + len];
        if ad_type == 0xFF {
            return Some(data);
        }
        pos += 1 + len;
    }
    None
}
