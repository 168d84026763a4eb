//! Monotonic tick arithmetic.
//!
//! The badge measures time as a wrapping `u32` millisecond counter rather
//! than a wall clock, so schedules survive the rollover that will otherwise
//! happen a few dozen days into a badge's uptime.

use std::sync::Mutex;
use std::time::Instant;

pub type Tick = u32;

/// Returns a tick value `ms` milliseconds after `now`, wrapping on overflow.
pub fn future(now: Tick, ms: u32) -> Tick {
    now.wrapping_add(ms)
}

/// True iff `now` is at or past `deadline`, accounting for wraparound via a
/// signed difference (mirrors the original firmware's `expired()` helper).
pub fn expired(now: Tick, deadline: Tick) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

/// Source of the monotonic millisecond tick. Abstracted so tests can drive
/// time explicitly instead of sleeping.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Tick;
}

/// Real wall-clock source, backed by `Instant`, used by the firmware crate.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Tick {
        self.start.elapsed().as_millis() as Tick
    }
}

/// Deterministic clock for tests: time only advances when told to.
#[derive(Default)]
pub struct FakeClock {
    now: std::sync::atomic::AtomicU32,
}

impl FakeClock {
    pub fn new(start: Tick) -> Self {
        Self {
            now: std::sync::atomic::AtomicU32::new(start),
        }
    }

    pub fn advance(&self, ms: u32) {
        self.now
            .fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, tick: Tick) {
        self.now.store(tick, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> Tick {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Wall-clock unix-seconds estimate, anchored to the most recent heartbeat
/// response and advanced by the monotonic tick elapsed since then. Grounded
/// on `spec.md` §4.11's "server-side timestamp used to set the system
/// clock adjusted by half the measured round-trip time" — the RTT
/// adjustment itself happens before `sync`, in `crate::http::adjust_server_time_for_rtt`.
#[derive(Default)]
pub struct WallClock {
    anchor: Mutex<Option<(Tick, u64)>>,
}

impl WallClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchors the clock: `unix_seconds` is the wall-clock time at `tick_now`.
    pub fn sync(&self, tick_now: Tick, unix_seconds: u64) {
        *self.anchor.lock().unwrap() = Some((tick_now, unix_seconds));
    }

    /// Returns the estimated unix-seconds at `tick_now`, or `0` if never
    /// synced (matches the original firmware's unset-clock sentinel).
    pub fn unix_seconds(&self, tick_now: Tick) -> u64 {
        match *self.anchor.lock().unwrap() {
            Some((anchor_tick, anchor_unix)) => {
                let elapsed_ms = tick_now.wrapping_sub(anchor_tick);
                anchor_unix + (elapsed_ms / 1000) as u64
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn future_adds_milliseconds() {
        assert_eq!(future(1_000, 500), 1_500);
    }

    #[test]
    fn future_wraps_on_overflow() {
        assert_eq!(future(u32::MAX, 10), 9);
    }

    #[test]
    fn expired_true_when_now_past_deadline() {
        assert!(expired(2_000, 1_000));
        assert!(expired(1_000, 1_000));
        assert!(!expired(999, 1_000));
    }

    #[test]
    fn expired_handles_wraparound() {
        // now has wrapped past zero, deadline was set just before the wrap.
        let deadline = u32::MAX - 10;
        let now = 5; // wrapped around
        assert!(expired(now, deadline));
    }

    #[test]
    fn fake_clock_advances_deterministically() {
        let clock = FakeClock::new(100);
        assert_eq!(clock.now_ms(), 100);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 150);
    }

    #[test]
    fn wall_clock_unsynced_reads_zero() {
        let clock = WallClock::new();
        assert_eq!(clock.unix_seconds(12_345), 0);
    }

    #[test]
    fn wall_clock_advances_from_its_anchor() {
        let clock = WallClock::new();
        clock.sync(1_000, 1_700_000_000);
        assert_eq!(clock.unix_seconds(1_000), 1_700_000_000);
        assert_eq!(clock.unix_seconds(6_000), 1_700_000_005);
    }
}
