//! JSON-driven LED sequence: parsed frame tree plus playback cursor.
//!
//! Grounded on `spec.md` §4.13/§8 ("LED sequence JSON schema") and
//! `original_source/main/src/LedControl.c`'s `cJSON`-parsed sequence player.
//! Deserializes straight from `serde_json::Value` so a malformed or
//! out-of-range document degrades to an empty sequence instead of a parser
//! crash, matching the "never abort outside init" rule in `spec.md` §7.

use serde::{Deserialize, Serialize};

use crate::led::color::Rgb;
use crate::time::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixel {
    #[serde(default = "default_sentinel")]
    pub n1: i32,
    #[serde(default = "default_sentinel")]
    pub n2: i32,
    #[serde(default)]
    pub r: u8,
    #[serde(default)]
    pub g: u8,
    #[serde(default)]
    pub b: u8,
    #[serde(default = "default_intensity")]
    pub i: u8,
}

fn default_sentinel() -> i32 {
    -2
}

fn default_intensity() -> u8 {
    100
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Frame {
    pub h: u32,
    pub p: Vec<Pixel>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct JsonSequenceDoc {
    pub f: Vec<Frame>,
}

/// Addressing mode resolved from a pixel's `(n1, n2)` pair, per `spec.md`
/// §4.13: `n1>=0,n2==-2` or `n1==-2,n2>=0` ⇒ single pixel; both ≥ 0 ⇒
/// inclusive range; either == -1 ⇒ all pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelAddress {
    Single(usize),
    Range(usize, usize),
    All,
}

pub fn resolve_address(n1: i32, n2: i32) -> Option<PixelAddress> {
    if n1 == -1 || n2 == -1 {
        return Some(PixelAddress::All);
    }
    match (n1, n2) {
        (n1, -2) if n1 >= 0 => Some(PixelAddress::Single(n1 as usize)),
        (-2, n2) if n2 >= 0 => Some(PixelAddress::Single(n2 as usize)),
        (n1, n2) if n1 >= 0 && n2 >= 0 => {
            let (lo, hi) = if n1 <= n2 { (n1, n2) } else { (n2, n1) };
            Some(PixelAddress::Range(lo as usize, hi as usize))
        }
        _ => None,
    }
}

/// Playback cursor over a parsed [`JsonSequenceDoc`].
pub struct SequenceCursor {
    doc: JsonSequenceDoc,
    frame_idx: usize,
    next_draw_at: Tick,
}

impl SequenceCursor {
    pub fn new(doc: JsonSequenceDoc, now: Tick) -> Self {
        Self {
            doc,
            frame_idx: 0,
            next_draw_at: now,
        }
    }

    pub fn from_json(bytes: &[u8], now: Tick) -> Option<Self> {
        let doc: JsonSequenceDoc = serde_json::from_slice(bytes).ok()?;
        if doc.f.is_empty() {
            return None;
        }
        Some(Self::new(doc, now))
    }

    /// Draws the current frame into `pixels` if due, advances the cursor,
    /// and returns `true` iff a draw happened (i.e. the strip needs a
    /// flush).
    pub fn tick(&mut self, now: Tick, pixels: &mut [Rgb]) -> bool {
        if self.doc.f.is_empty() || !crate::time::expired(now, self.next_draw_at) {
            return false;
        }

        let frame = &self.doc.f[self.frame_idx];
        for pixel in &frame.p {
            if let Some(address) = resolve_address(pixel.n1, pixel.n2) {
                let color = Rgb::new(pixel.r, pixel.g, pixel.b).scaled(pixel.i);
                match address {
                    PixelAddress::Single(i) => {
                        if i < pixels.len() {
                            pixels[i] = color;
                        }
                    }
                    PixelAddress::Range(lo, hi) => {
                        for p in pixels.iter_mut().take((hi + 1).min(pixels.len())).skip(lo) {
                            *p = color;
                        }
                    }
                    PixelAddress::All => {
                        for p in pixels.iter_mut() {
                            *p = color;
                        }
                    }
                }
            }
        }

        self.frame_idx = (self.frame_idx + 1) % self.doc.f.len();
        self.next_draw_at = crate::time::future(now, frame.h);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pixel_address_with_n2_sentinel() {
        assert_eq!(resolve_address(5, -2), Some(PixelAddress::Single(5)));
        assert_eq!(resolve_address(-2, 7), Some(PixelAddress::Single(7)));
    }

    #[test]
    fn range_address_normalizes_order() {
        assert_eq!(resolve_address(8, 3), Some(PixelAddress::Range(3, 8)));
    }

    #[test]
    fn minus_one_means_all_pixels() {
        assert_eq!(resolve_address(-1, 0), Some(PixelAddress::All));
        assert_eq!(resolve_address(0, -1), Some(PixelAddress::All));
    }

    #[test]
    fn cursor_draws_and_advances_on_expiry() {
        let doc = JsonSequenceDoc {
            f: vec![
                Frame {
                    h: 100,
                    p: vec![Pixel {
                        n1: 0,
                        n2: -2,
                        r: 255,
                        g: 0,
                        b: 0,
                        i: 100,
                    }],
                },
                Frame {
                    h: 100,
                    p: vec![Pixel {
                        n1: 0,
                        n2: -2,
                        r: 0,
                        g: 255,
                        b: 0,
                        i: 100,
                    }],
                },
            ],
        };
        let mut cursor = SequenceCursor::new(doc, 0);
        let mut pixels = vec![Rgb::BLACK; 4];
        assert!(cursor.tick(0, &mut pixels));
        assert_eq!(pixels[0].r > 0, true);
        assert!(!cursor.tick(50, &mut pixels));
        assert!(cursor.tick(100, &mut pixels));
        assert!(pixels[0].g > 0);
    }

    #[test]
    fn malformed_json_yields_no_sequence() {
        assert!(SequenceCursor::from_json(b"not json", 0).is_none());
        assert!(SequenceCursor::from_json(b"{\"f\":[]}", 0).is_none());
    }
}
