//! Wi-Fi station client: reference-counted connect/disconnect lifecycle.
//!
//! Grounded on `original_source/main/inc/WifiClient.h` /
//! `main/src/WifiClient.c`. Kept hardware-agnostic: this module owns only
//! the state machine and ref-counting; the firmware crate's `esp-idf-svc`
//! adapter drives the real scan/connect calls and feeds their outcomes back
//! in via `on_station_started` / `on_disconnected_event` / `on_got_ip`,
//! mirroring the original's `WifiIpEventHandler`.

use crate::time::Tick;

/// The original's `CONFIG_WIFI_MAX_RETRY` is a build-time Kconfig value;
/// this core picks a fixed default since badge-core has no Kconfig
/// equivalent. Documented as an Open Question resolution in `DESIGN.md`.
pub const DEFAULT_MAX_RETRIES: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Unknown,
    Disconnected,
    Waiting,
    Attempting,
    Connecting,
    Connected,
    Failed,
}

pub struct WifiClient {
    state: WifiState,
    retry_count: u8,
    max_retries: u8,
    num_clients: i32,
    desired_start: Tick,
}

impl WifiClient {
    pub fn new(max_retries: u8) -> Self {
        Self {
            state: WifiState::Disconnected,
            retry_count: 0,
            max_retries,
            num_clients: 0,
            desired_start: 0,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// Mirrors `_WifiClient_Enable`: only fires from a stopped-ish state.
    /// Returns `true` if the caller should now actually start the driver
    /// and scan/connect.
    fn enable(&mut self) -> bool {
        if matches!(
            self.state,
            WifiState::Disconnected | WifiState::Waiting | WifiState::Failed
        ) {
            self.state = WifiState::Attempting;
            true
        } else {
            false
        }
    }

    /// Mirrors `WifiClient_RequestConnect`. Ref-counts the caller in
    /// regardless of outcome; if not already connecting/connected, either
    /// starts immediately (`wait_ms == 0`) or schedules a start at
    /// `now + wait_ms`, shortening an already-pending wait if the new
    /// request asks for sooner. Returns `true` if the caller should now
    /// actually start the driver.
    pub fn request_connect(&mut self, now: Tick, wait_ms: u32) -> bool {
        self.num_clients += 1;

        if matches!(
            self.state,
            WifiState::Attempting | WifiState::Connecting | WifiState::Connected
        ) {
            return false;
        }

        if matches!(self.state, WifiState::Disconnected | WifiState::Failed) {
            if wait_ms == 0 {
                return self.enable();
            }
            self.state = WifiState::Waiting;
            self.desired_start = crate::time::future(now, wait_ms);
        } else if self.state == WifiState::Waiting {
            let candidate = crate::time::future(now, wait_ms);
            if (candidate.wrapping_sub(self.desired_start) as i32) < 0 {
                self.desired_start = candidate;
            }
        }
        false
    }

    /// Run periodically; fires the pending start once its deadline passes.
    /// Returns `true` if the caller should now start the driver.
    pub fn tick(&mut self, now: Tick) -> bool {
        if self.state == WifiState::Waiting && crate::time::expired(now, self.desired_start) {
            return self.enable();
        }
        false
    }

    /// Mirrors `WifiClient_Disconnect`: decrements the ref count and
    /// returns `true` iff it dropped to zero while actually connected (the
    /// caller should then stop the real driver). The original's teardown
    /// state is resolved by the event handler, not this call.
    pub fn disconnect(&mut self) -> bool {
        self.num_clients -= 1;
        let should_stop = self.num_clients <= 0
            && matches!(
                self.state,
                WifiState::Attempting | WifiState::Connecting | WifiState::Connected
            );
        if self.num_clients < 0 {
            self.num_clients = 0;
        }
        should_stop
    }

    /// `WIFI_EVENT_STA_START`.
    pub fn on_station_started(&mut self) {
        self.retry_count = 0;
        self.state = WifiState::Connecting;
    }

    /// `WIFI_EVENT_STA_STOP`.
    pub fn on_station_stopped(&mut self) {
        self.retry_count = self.max_retries;
        self.state = WifiState::Disconnected;
    }

    /// `WIFI_EVENT_STA_DISCONNECTED`. Returns `true` if the caller should
    /// retry the connect.
    pub fn on_disconnected_event(&mut self) -> bool {
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.state = WifiState::Connecting;
            true
        } else {
            self.state = WifiState::Failed;
            false
        }
    }

    /// `IP_EVENT_STA_GOT_IP`.
    pub fn on_got_ip(&mut self) {
        self.retry_count = 0;
        self.state = WifiState::Connected;
    }
}

/// Which credential source matched a scanned AP, so the caller knows which
/// password to pair with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsidSource {
    CompiledIn,
    User,
}

/// Mirrors the scan loop in `_WifiClient_Enable`: walks the scanned AP list
/// in order, and for each checks the compiled-in SSID before the
/// user-settings SSID, stopping at the first match either way.
pub fn select_ssid<'a>(
    scanned: impl IntoIterator<Item = &'a str>,
    compiled_in_ssid: &str,
    user_ssid: &str,
) -> Option<(usize, SsidSource)> {
    for (index, ssid) in scanned.into_iter().enumerate() {
        if !compiled_in_ssid.is_empty() && ssid == compiled_in_ssid {
            return Some((index, SsidSource::CompiledIn));
        }
        if !user_ssid.is_empty() && ssid == user_ssid {
            return Some((index, SsidSource::User));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_connect_with_zero_wait_starts_immediately() {
        let mut client = WifiClient::new(DEFAULT_MAX_RETRIES);
        assert!(client.request_connect(0, 0));
        assert_eq!(client.state(), WifiState::Attempting);
    }

    #[test]
    fn request_connect_with_wait_schedules_a_future_start() {
        let mut client = WifiClient::new(DEFAULT_MAX_RETRIES);
        assert!(!client.request_connect(0, 1000));
        assert_eq!(client.state(), WifiState::Waiting);
        assert!(!client.tick(500));
        assert!(client.tick(1000));
        assert_eq!(client.state(), WifiState::Attempting);
    }

    #[test]
    fn second_request_shortens_pending_wait() {
        let mut client = WifiClient::new(DEFAULT_MAX_RETRIES);
        client.request_connect(0, 5000);
        client.request_connect(0, 500);
        assert!(!client.tick(499));
        assert!(client.tick(500));
    }

    #[test]
    fn disconnect_only_signals_stop_once_all_clients_left() {
        let mut client = WifiClient::new(DEFAULT_MAX_RETRIES);
        client.request_connect(0, 0);
        client.request_connect(0, 0);
        client.on_station_started();
        client.on_got_ip();
        assert!(!client.disconnect());
        assert!(client.disconnect());
    }

    #[test]
    fn disconnect_ref_count_never_goes_negative() {
        let mut client = WifiClient::new(DEFAULT_MAX_RETRIES);
        assert!(!client.disconnect());
        assert!(!client.disconnect());
    }

    #[test]
    fn exhausting_retries_transitions_to_failed() {
        let mut client = WifiClient::new(2);
        client.request_connect(0, 0);
        client.on_station_started();
        assert!(client.on_disconnected_event());
        assert!(client.on_disconnected_event());
        assert!(!client.on_disconnected_event());
        assert_eq!(client.state(), WifiState::Failed);
    }

    #[test]
    fn got_ip_resets_retry_count_and_connects() {
        let mut client = WifiClient::new(2);
        client.request_connect(0, 0);
        client.on_station_started();
        client.on_disconnected_event();
        client.on_got_ip();
        assert_eq!(client.state(), WifiState::Connected);
        assert!(client.on_disconnected_event(), "retry budget should be fresh after a reconnect");
    }

    #[test]
    fn select_ssid_prefers_compiled_in_over_user_on_the_same_ap() {
        let scanned = ["OtherNetwork", "HomeWifi"];
        let result = select_ssid(scanned, "HomeWifi", "HomeWifi");
        assert_eq!(result, Some((1, SsidSource::CompiledIn)));
    }

    #[test]
    fn select_ssid_falls_back_to_user_ssid() {
        let scanned = ["OtherNetwork", "MyPersonalWifi"];
        let result = select_ssid(scanned, "BadgeDefaultAP", "MyPersonalWifi");
        assert_eq!(result, Some((1, SsidSource::User)));
    }

    #[test]
    fn select_ssid_returns_none_when_nothing_matches() {
        let scanned = ["OtherNetwork"];
        assert_eq!(select_ssid(scanned, "BadgeDefaultAP", "MyPersonalWifi"), None);
    }
}
