//! ESP32 native capacitive touch pads, feeding [`badge_core::touch::TouchClassifier`].
//!
//! The teacher's board has no capacitive touch (chess uses the MCP23017
//! GPIO matrix in `board.rs`); grounded instead on
//! `original_source/main/src/TouchSensor.c`'s `touch_pad_config` /
//! `touch_pad_read_raw_data` calls, reached here through raw `esp-idf-sys`
//! FFI the way the pack's `dougborg-AirHound` firmware calls
//! `esp_wifi_set_promiscuous` directly rather than through a higher-level
//! wrapper crate — `esp-idf-hal` has no touch-pad abstraction.

use badge_core::touch::NUM_ELECTRODES;
use esp_idf_sys::{
    esp, touch_pad_config, touch_pad_filter_start, touch_pad_init, touch_pad_read_raw_data,
    touch_pad_set_voltage, touch_pad_t, touch_high_volt_t_TOUCH_HVOLT_2V7,
    touch_low_volt_t_TOUCH_LVOLT_0V5, touch_volt_atten_t_TOUCH_HVOLT_ATTEN_1V,
};

const TOUCH_FILTER_PERIOD_MS: u32 = 50;

pub struct TouchSensor {
    pads: [touch_pad_t; NUM_ELECTRODES],
}

impl TouchSensor {
    /// `pad_map` is the board-specific `TOUCH_BUTTON_MAP` (electrode index
    /// -> native `T0..T9` touch pad), since the wiring differs per badge
    /// type.
    pub fn new(pad_map: [touch_pad_t; NUM_ELECTRODES]) -> anyhow::Result<Self> {
        unsafe {
            esp!(touch_pad_init())?;
            esp!(touch_pad_set_voltage(
                touch_high_volt_t_TOUCH_HVOLT_2V7,
                touch_low_volt_t_TOUCH_LVOLT_0V5,
                touch_volt_atten_t_TOUCH_HVOLT_ATTEN_1V,
            ))?;
            for pad in pad_map {
                esp!(touch_pad_config(pad, 0))?;
            }
            esp!(touch_pad_filter_start(TOUCH_FILTER_PERIOD_MS))?;
        }
        Ok(Self { pads: pad_map })
    }

    /// Raw reading for every electrode, in `badge-core` electrode-index
    /// order, for [`badge_core::touch::TouchClassifier::sample`].
    pub fn read_raw(&self) -> anyhow::Result<[i32; NUM_ELECTRODES]> {
        let mut values = [0i32; NUM_ELECTRODES];
        for (i, pad) in self.pads.iter().enumerate() {
            let mut raw: u16 = 0;
            unsafe {
                esp!(touch_pad_read_raw_data(*pad, &mut raw))?;
            }
            values[i] = raw as i32;
        }
        Ok(values)
    }
}
