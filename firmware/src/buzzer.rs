//! PWM piezo buzzer, wired to [`badge_core::hal::Buzzer`].
//!
//! No teacher code drives a buzzer (the chess board has none); grounded per
//! `SPEC_FULL.md` §4.14 on `esp-idf-hal`'s `ledc` PWM idiom: one timer
//! retuned to the requested tone frequency, one channel held at half duty
//! while a tone is sounding and zero duty when stopped.

use badge_core::hal::Buzzer;
use esp_idf_hal::ledc::LedcDriver;

/// Owns the PWM channel; retuning a tone means reconfiguring the channel's
/// timer frequency, so `LedcDriver` (which wraps both) is kept whole rather
/// than split into a separate timer handle.
pub struct PwmBuzzer<'a> {
    driver: LedcDriver<'a>,
}

impl<'a> PwmBuzzer<'a> {
    pub fn new(driver: LedcDriver<'a>) -> Self {
        Self { driver }
    }
}

impl<'a> Buzzer for PwmBuzzer<'a> {
    fn tone(&mut self, freq_hz: u16) -> anyhow::Result<()> {
        if freq_hz == 0 {
            return self.stop();
        }
        self.driver.set_frequency(esp_idf_hal::units::Hertz(freq_hz as u32))?;
        let duty = self.driver.get_max_duty() / 2;
        self.driver.set_duty(duty)?;
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.driver.set_duty(0)?;
        Ok(())
    }
}
