//! Vibration motor driven as a GPIO output pin, pulsed for a fixed duration.
//!
//! The teacher has no motor at all; grounded on the same "own a
//! `PinDriver`, flip it in a blocking loop" shape `board.rs` uses for its
//! I2C reads, here applied to a digital output instead.

use badge_core::hal::Vibration;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{Output, PinDriver};

pub struct GpioVibrator<'a> {
    pin: PinDriver<'a, esp_idf_hal::gpio::AnyOutputPin, Output>,
}

impl<'a> GpioVibrator<'a> {
    pub fn new(pin: PinDriver<'a, esp_idf_hal::gpio::AnyOutputPin, Output>) -> Self {
        Self { pin }
    }
}

impl<'a> Vibration for GpioVibrator<'a> {
    fn pulse(&mut self, duration: std::time::Duration) -> anyhow::Result<()> {
        self.pin.set_high()?;
        FreeRtos::delay_ms(duration.as_millis() as u32);
        self.pin.set_low()?;
        Ok(())
    }
}
