//! Ocarina matcher: touch-to-melody pattern recognition.
//!
//! Grounded on `original_source/main/inc/Ocarina.h` / `main/src/Ocarina.c`'s
//! `Ocarina_TouchSensorNotificationHandler`. Every electrode touch pushes
//! into a fixed-capacity circular buffer; each table entry is checked in
//! order against the buffer's most recent presses, and the first whose key
//! sequence matches wins (`break` in the original's table loop).

use crate::circbuf::CircularBuffer;
use crate::songs::Song;
use crate::touch::NUM_ELECTRODES;

/// Matches `original_source`'s `CircularBuffer ocarinaKeys` depth.
pub const BUFFER_CAPACITY: usize = 8;

/// One learnable melody: the electrode sequence that plays it, in order.
pub struct MelodyEntry {
    pub name: &'static str,
    pub keys: &'static [usize],
    pub song: Song,
}

/// Electrode-index key table, grounded on `Ocarina.h`'s `OcarinaKeySet`
/// entries. Electrode indices are placeholders within `0..NUM_ELECTRODES`;
/// `spec.md` §1 excludes the original composed melodies from scope, so this
/// table reproduces only the shape (name, song, key count) the matcher
/// needs to operate on.
pub fn melody_table() -> Vec<MelodyEntry> {
    vec![
        MelodyEntry { name: "Zelda's Lullaby", keys: &[0, 4, 7, 0, 4, 7], song: Song::ZeldasLullaby },
        MelodyEntry { name: "Epona's Song", keys: &[4, 7, 0, 4, 7, 0], song: Song::EponasSong },
        MelodyEntry { name: "Saria's Song", keys: &[5, 4, 0, 5, 4, 0], song: Song::SariasSong },
        MelodyEntry { name: "Song of Storms", keys: &[2, 7, 4, 2, 7, 4], song: Song::SongOfStorms },
        MelodyEntry { name: "Song of Time", keys: &[0, 7, 4, 0, 7, 4], song: Song::SongOfTime },
        MelodyEntry { name: "Sun's Song", keys: &[7, 4, 0, 7, 4, 0], song: Song::SunsSong },
        MelodyEntry { name: "Bolero of Fire", keys: &[2, 5, 2, 5, 4, 7, 4, 7], song: Song::BoleroOfFire },
        MelodyEntry { name: "Serenade of Water", keys: &[0, 5, 7, 4], song: Song::SerenadeOfWater },
        MelodyEntry { name: "Prelude of Light", keys: &[7, 0, 7, 0, 4], song: Song::PreludeOfLight },
        MelodyEntry { name: "Requiem of Spirit", keys: &[2, 7, 0, 2, 7, 0], song: Song::RequiemOfSpirit },
    ]
}

/// Tracks touch presses while ocarina mode is active and matches them
/// against [`melody_table`]'s learnable melodies.
pub struct OcarinaMatcher {
    buffer: CircularBuffer<usize>,
    table: Vec<MelodyEntry>,
}

impl OcarinaMatcher {
    pub fn new(table: Vec<MelodyEntry>) -> Self {
        Self {
            buffer: CircularBuffer::new(BUFFER_CAPACITY),
            table,
        }
    }

    /// Pushes a touched electrode and checks every table entry in order;
    /// returns the index into the table of the first match, clearing the
    /// buffer on a hit. A full buffer drops the oldest press first, since
    /// only the most recent [`BUFFER_CAPACITY`] presses can ever match.
    pub fn on_electrode_touched(&mut self, electrode: usize) -> Option<usize> {
        debug_assert!(electrode < NUM_ELECTRODES);
        if self.buffer.push_back(electrode).is_err() {
            self.buffer.pop_front();
            let _ = self.buffer.push_back(electrode);
        }

        for (index, entry) in self.table.iter().enumerate() {
            if self.buffer.count() >= entry.keys.len() && self.buffer.ends_with(entry.keys) {
                self.buffer.clear();
                return Some(index);
            }
        }
        None
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_table() -> Vec<MelodyEntry> {
        vec![
            MelodyEntry { name: "Short", keys: &[1, 2], song: Song::SuccessSound },
            MelodyEntry { name: "Long", keys: &[1, 2, 3, 4], song: Song::SecretSound },
        ]
    }

    #[test]
    fn matches_first_entry_whose_suffix_fits() {
        let mut matcher = OcarinaMatcher::new(test_table());
        matcher.on_electrode_touched(1);
        let matched = matcher.on_electrode_touched(2);
        assert_eq!(matched, Some(0));
    }

    #[test]
    fn buffer_clears_after_a_match() {
        let mut matcher = OcarinaMatcher::new(test_table());
        matcher.on_electrode_touched(1);
        matcher.on_electrode_touched(2);
        assert_eq!(matcher.buffer.count(), 0);
    }

    #[test]
    fn non_matching_presses_yield_no_match() {
        let mut matcher = OcarinaMatcher::new(test_table());
        matcher.on_electrode_touched(5);
        matcher.on_electrode_touched(6);
        assert_eq!(matcher.on_electrode_touched(7), None);
    }

    #[test]
    fn overflow_past_capacity_drops_oldest_press() {
        let mut matcher = OcarinaMatcher::new(test_table());
        for electrode in 0..BUFFER_CAPACITY {
            matcher.on_electrode_touched(electrode);
        }
        // buffer now full of 0..BUFFER_CAPACITY; pushing again must not error.
        assert_eq!(matcher.on_electrode_touched(8), None);
    }
}
