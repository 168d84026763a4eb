//! ADC battery voltage reader, wired to [`badge_core::hal::BatteryMonitor`].
//!
//! Grounded on the teacher's `board.rs`: a blocking read taken in a tight
//! loop and folded into one value, the same shape as `board.rs`'s
//! per-column `i2c.read` loop folded into a `BitBoard`, here folded into
//! [`badge_core::battery::average_raw`] instead of bit-shifted columns.

use badge_core::battery::{average_raw, voltage_to_percent, SAMPLE_COUNT};
use badge_core::hal::BatteryMonitor;
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::adc::ADC1;
use esp_idf_hal::gpio::ADCPin;

/// Millivolts per ADC-to-percent calibration unit; the raw-to-voltage slope
/// is board-specific, so it stays in `firmware` rather than `badge-core`.
const ADC_REFERENCE_MV: u32 = 3300;
const ADC_MAX_READING: u32 = 4095;

/// The channel driver borrows the ADC driver it reads through, so the ADC
/// driver is leaked to `'static` rather than co-owned in this struct — the
/// battery task (and the driver) lives for the whole program anyway, and
/// this avoids a self-referential struct across the thread-spawn boundary.
pub struct AdcBatteryMonitor<P: ADCPin<Adc = ADC1>> {
    channel: AdcChannelDriver<'static, P, &'static AdcDriver<'static, ADC1>>,
    is_charging: bool,
}

impl<P: ADCPin<Adc = ADC1>> AdcBatteryMonitor<P> {
    pub fn new(adc: AdcDriver<'static, ADC1>, pin: P) -> anyhow::Result<Self> {
        let adc: &'static AdcDriver<'static, ADC1> = Box::leak(Box::new(adc));
        let channel = AdcChannelDriver::new(
            adc,
            pin,
            &esp_idf_hal::adc::oneshot::config::AdcChannelConfig::new(),
        )?;
        Ok(Self {
            channel,
            is_charging: false,
        })
    }

    fn read_once(&mut self) -> anyhow::Result<u16> {
        Ok(self.channel.read()?)
    }
}

impl<P: ADCPin<Adc = ADC1>> BatteryMonitor for AdcBatteryMonitor<P> {
    fn voltage_mv(&mut self) -> anyhow::Result<u16> {
        let mut samples = [0u16; SAMPLE_COUNT];
        for sample in samples.iter_mut() {
            *sample = self.read_once()?;
        }
        let raw = average_raw(&samples);
        let mv = raw * ADC_REFERENCE_MV / ADC_MAX_READING;
        Ok(mv as u16)
    }

    fn is_charging(&mut self) -> anyhow::Result<bool> {
        Ok(self.is_charging)
    }
}

/// Converts a read `voltage_mv()` to the percent `badge-core` stores;
/// kept here rather than in the trait so `badge-core` owns the curve and
/// `firmware` only supplies millivolts, per `spec.md` §4.4.
pub fn mv_to_percent(mv: u16) -> u8 {
    voltage_to_percent(mv as f32 / 1000.0)
}
