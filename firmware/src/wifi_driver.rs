//! `esp-idf-svc` Wi-Fi driver, driven by [`badge_core::wifi::WifiClient`].
//!
//! Grounded on the pack's `dougborg-AirHound` firmware (`BlockingWifi::wrap`
//! around `EspWifi`, one `EspSystemEventLoop` taken once in `main`). The
//! state machine in `badge_core::wifi` decides *when* to connect/disconnect
//! and tracks retries; this driver only translates those decisions into
//! real `esp-idf-svc` calls and feeds connection outcomes back with
//! `on_station_started`/`on_disconnected_event`/`on_got_ip`.

use std::sync::Mutex;

use badge_core::wifi::WifiClient;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

pub struct WifiDriver<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
    client: Mutex<WifiClient>,
}

impl<'a> WifiDriver<'a> {
    pub fn new(wifi: BlockingWifi<EspWifi<'a>>, max_retries: u8) -> Self {
        Self {
            wifi,
            client: Mutex::new(WifiClient::new(max_retries)),
        }
    }

    pub fn client(&self) -> std::sync::MutexGuard<'_, WifiClient> {
        self.client.lock().expect("wifi client mutex poisoned")
    }

    /// Actually brings the radio up against `ssid`/`password` and blocks
    /// until connected or the driver gives up, then feeds the outcome back
    /// into the state machine.
    pub fn connect(&mut self, ssid: &str, password: &str) -> anyhow::Result<()> {
        self.wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| anyhow::anyhow!("ssid too long"))?,
            password: password.try_into().map_err(|_| anyhow::anyhow!("password too long"))?,
            auth_method: AuthMethod::WPA2Personal,
            ..Default::default()
        }))?;

        self.wifi.start()?;
        self.client().on_station_started();

        match self.wifi.connect() {
            Ok(()) => {}
            Err(e) => {
                let should_retry = self.client().on_disconnected_event();
                if should_retry {
                    return self.connect(ssid, password);
                }
                return Err(e.into());
            }
        }

        self.wifi.wait_netif_up()?;
        self.client().on_got_ip();
        Ok(())
    }

    pub fn disconnect(&mut self) -> anyhow::Result<()> {
        if self.client().disconnect() {
            self.wifi.stop()?;
            self.client().on_station_stopped();
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }
}
