//! OTA firmware flashing over HTTP, wired to the `esp-ota` crate.
//!
//! Grounded on `original_source/main/src/OtaUpdate.c`'s `esp_https_ota`-based
//! update flow (periodic `OTA_CHECK_DELAY_MS` check, version comparison
//! against the running partition, then a full download-and-flash) and the
//! teacher's `bluetooth/handlers/ota.rs` for the `esp-ota` crate idiom
//! (`OtaUpdate::begin()` / `.write()` / `.finalize()` /
//! `.set_as_boot_partition()`). The teacher streams firmware bytes in over
//! BLE characteristic writes; this badge has no BLE OTA channel, so the same
//! writer is instead fed from one buffered `HttpTransport` response — the
//! firmware image is small enough, and the surrounding `RequestQueue`
//! already only deals in whole-body requests/responses, to make a chunked
//! download HttpTransport can't yet do not worth adding for this adapter.

use std::sync::Arc;
use std::time::Duration;

use badge_core::event::Event;
use badge_core::hal::{HttpMethod, HttpTransport as _};
use badge_core::time::Tick;
use badge_core::Bus;
use esp_ota::OtaUpdate;
use log::*;

use crate::coordinator_task::CoordinatorTask;
use crate::http_transport::EspHttpTransport;

/// Placeholder firmware-image endpoint; mirrors the `OTA_URL` per-badge-type
/// macro in `OtaUpdate.c` (here a single stand-in host, since badge type
/// selection is out of this adapter's scope).
pub const OTA_FIRMWARE_URL: &str = "https://badge.example.invalid/ota/firmware.bin";

/// Downloads the new firmware image and flashes it to the inactive OTA
/// partition. Called once `dispatch_request` sees a successful
/// `RequestKind::OtaCheck` response, i.e. once the server has already told
/// this badge an update is available (`Event::OtaRequired` is notified by
/// the caller before this runs).
pub fn perform_ota(transport: &mut EspHttpTransport, bus: &Bus, coordinator: &Arc<CoordinatorTask>, now: Tick) {
    coordinator.set_ota_in_progress(true, now);
    let _ = bus.notify(Event::OtaInitiated, Duration::from_millis(50));

    let response = match transport.request(HttpMethod::Get, OTA_FIRMWARE_URL, None, Duration::from_secs(60)) {
        Ok(r) if (200..300).contains(&r.status) => r,
        Ok(r) => {
            warn!("OTA image fetch returned status {}", r.status);
            coordinator.set_ota_in_progress(false, now);
            return;
        }
        Err(e) => {
            warn!("OTA image fetch failed: {:?}", e);
            coordinator.set_ota_in_progress(false, now);
            return;
        }
    };

    let flashed = flash_image(&response.body);
    coordinator.set_ota_in_progress(false, now);

    match flashed {
        Ok(()) => {
            info!("OTA flash succeeded ({} bytes), restarting", response.body.len());
            let _ = bus.notify(Event::OtaComplete, Duration::from_millis(50));
            std::thread::spawn(|| {
                std::thread::sleep(Duration::from_secs(2));
                unsafe {
                    esp_idf_sys::esp_restart();
                }
            });
        }
        Err(e) => warn!("OTA flash failed: {:?}", e),
    }
}

fn flash_image(image: &[u8]) -> anyhow::Result<()> {
    let mut ota = OtaUpdate::begin().map_err(|e| anyhow::anyhow!("OTA begin failed: {:?}", e))?;
    ota.write(image).map_err(|e| anyhow::anyhow!("OTA write failed: {:?}", e))?;
    let mut completed = ota.finalize().map_err(|e| anyhow::anyhow!("OTA finalize failed: {:?}", e))?;
    completed
        .set_as_boot_partition()
        .map_err(|e| anyhow::anyhow!("OTA set boot partition failed: {:?}", e))?;
    Ok(())
}
