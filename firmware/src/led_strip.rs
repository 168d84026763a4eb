//! WS2812 LED strip, wired to [`badge_core::hal::Strip`].
//!
//! Grounded on the teacher's `display.rs` (`Ws2812Esp32Rmt` ownership, RMT
//! write-on-change). The teacher diffed a fixed 8x8 chess board into a
//! stack array and called `write_nocopy`; a badge strip's length is only
//! known at runtime (it comes from `UserSettings`/board config), so this
//! wrapper keeps a `Vec<RGB8>` pixel buffer instead and uses the
//! `smart-leds` `SmartLedsWrite::write` entry point over an iterator.

use badge_core::hal::Strip;
use smart_leds::{SmartLedsWrite, RGB8};
use ws2812_esp32_rmt_driver::Ws2812Esp32Rmt;

pub struct Ws2812Strip<'a> {
    driver: Ws2812Esp32Rmt<'a>,
    pixels: Vec<RGB8>,
}

impl<'a> Ws2812Strip<'a> {
    pub fn new(driver: Ws2812Esp32Rmt<'a>, len: usize) -> Self {
        Self {
            driver,
            pixels: vec![RGB8::default(); len],
        }
    }
}

impl<'a> Strip for Ws2812Strip<'a> {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn set_pixel(&mut self, index: usize, r: u8, g: u8, b: u8) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = RGB8 { r, g, b };
        }
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.driver
            .write(self.pixels.iter().copied())
            .map_err(|e| anyhow::anyhow!("ws2812 write failed: {:?}", e))
    }
}
