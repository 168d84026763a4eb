//! Audio/synth engine: song queue, per-note timing, and touch-to-tone.
//!
//! Grounded on `spec.md` §4.14 and `original_source/main/src/SynthMode.c`'s
//! `Synth_PlaySongTask` (note iteration, inter-note gap, slur handling) and
//! `Synth_TouchSensorNotificationHandler` (touch → tone). The PWM piezo
//! itself is a `firmware`-crate concern reached through
//! [`crate::hal::Buzzer`]; this module is a pure tick-driven state machine
//! so the note-timing and queueing logic is unit-testable without a real
//! buzzer, following the same split `[`crate::led::pipeline`] uses for the
//! render loop vs. the `Strip` trait.

use std::collections::VecDeque;

use thiserror::Error;

use crate::songs::{Note, Song, SongAction};
use crate::time::Tick;
use crate::touch::{TouchState, NUM_ELECTRODES};

/// `spec.md` §4.14: "A song queue (10 entries) holds pending plays".
pub const SONG_QUEUE_CAPACITY: usize = 10;
/// Gap inserted between two consecutive non-slurred notes.
pub const INTER_NOTE_GAP_MS: u32 = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SongQueueError {
    #[error("song queue is full")]
    Full,
}

/// One emitted note transition, matching `spec.md` §4.14's
/// `SongNoteAction { song, action, note }` event shape exactly; the caller
/// wraps this into `crate::event::Event::SongNoteAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteTransition {
    pub song: Song,
    pub action: SongAction,
    pub note_freq_hz: u16,
}

/// Duration, in milliseconds, a note of `sixteenths` sixteenth-notes takes
/// at `tempo` beats per minute: `(60000 / tempo) * 4 * (sixteenths / 16)`,
/// per `spec.md` §4.14, rearranged to stay in integer arithmetic.
pub fn note_duration_ms(tempo: u32, note: Note) -> u32 {
    (60_000 * note.sixteenths as u32) / (tempo * 4)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    PlayingNote,
    Gap,
}

struct Playing {
    song: Song,
    note_index: usize,
    phase: Phase,
    next_transition_at: Tick,
}

/// Bounded FIFO of songs waiting to play. A song already playing keeps
/// playing to completion before the next one dequeues (`spec.md` §4.14:
/// "the currently-playing song has priority").
#[derive(Default)]
pub struct SongQueue {
    items: VecDeque<Song>,
}

impl SongQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, song: Song) -> Result<(), SongQueueError> {
        if self.items.len() >= SONG_QUEUE_CAPACITY {
            return Err(SongQueueError::Full);
        }
        self.items.push_back(song);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Song> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Drives the single PWM tone channel: one song plays at a time, drawn from
/// [`SongQueue`]; outside of song playback, touch presses can drive tones
/// directly (touch-to-tone mode, toggled by `spec.md` §4.7's
/// `ToggleSynthMode` command).
pub struct SynthEngine {
    queue: SongQueue,
    playing: Option<Playing>,
    touch_to_tone_enabled: bool,
    octave_shift: i8,
    touch_tone_active: [bool; NUM_ELECTRODES],
}

impl SynthEngine {
    pub fn new() -> Self {
        Self {
            queue: SongQueue::new(),
            playing: None,
            touch_to_tone_enabled: false,
            octave_shift: 0,
            touch_tone_active: [false; NUM_ELECTRODES],
        }
    }

    pub fn is_song_playing(&self) -> bool {
        self.playing.is_some()
    }

    pub fn set_touch_to_tone(&mut self, enabled: bool, octave_shift: i8) {
        self.touch_to_tone_enabled = enabled;
        self.octave_shift = octave_shift;
        if !enabled {
            self.touch_tone_active = [false; NUM_ELECTRODES];
        }
    }

    /// Enqueues `song`; starts playing immediately if nothing else is
    /// currently playing.
    pub fn play_song(&mut self, song: Song, now: Tick) -> Result<Option<NoteTransition>, SongQueueError> {
        self.queue.push(song)?;
        Ok(self.maybe_start_next(now))
    }

    fn maybe_start_next(&mut self, now: Tick) -> Option<NoteTransition> {
        if self.playing.is_some() {
            return None;
        }
        let song = self.queue.pop()?;
        let notes = song.notes();
        if notes.is_empty() {
            return None;
        }
        let first = notes[0];
        let duration = note_duration_ms(song.tempo(), first);
        self.playing = Some(Playing {
            song,
            note_index: 0,
            phase: Phase::PlayingNote,
            next_transition_at: crate::time::future(now, duration),
        });
        Some(NoteTransition {
            song,
            action: SongAction::SongStart,
            note_freq_hz: first.freq_hz,
        })
    }

    /// Advances the currently-playing song (if any) past `now`, returning
    /// every note/gap transition that occurred. Call this once per synth
    /// task iteration; it's a no-op when nothing is playing.
    pub fn tick(&mut self, now: Tick) -> Vec<NoteTransition> {
        let mut transitions = Vec::new();

        loop {
            let Some(playing) = &self.playing else {
                if let Some(t) = self.maybe_start_next(now) {
                    transitions.push(t);
                    continue;
                }
                break;
            };
            if !crate::time::expired(now, playing.next_transition_at) {
                break;
            }

            let song = playing.song;
            let notes = song.notes();
            let current = notes[playing.note_index];

            match playing.phase {
                Phase::PlayingNote => {
                    let needs_gap = !current.slur && playing.note_index + 1 < notes.len();
                    if needs_gap {
                        let playing = self.playing.as_mut().unwrap();
                        playing.phase = Phase::Gap;
                        playing.next_transition_at =
                            crate::time::future(playing.next_transition_at, INTER_NOTE_GAP_MS);
                        if !current.is_rest() {
                            transitions.push(NoteTransition {
                                song,
                                action: SongAction::ToneStop,
                                note_freq_hz: current.freq_hz,
                            });
                        }
                    } else {
                        self.advance_to_next_note(song, &mut transitions, now);
                    }
                }
                Phase::Gap => {
                    self.advance_to_next_note(song, &mut transitions, now);
                }
            }
        }

        transitions
    }

    /// Moves to the next note in the current song, or finishes the song and
    /// starts the next queued one if this was the last note.
    fn advance_to_next_note(&mut self, song: Song, transitions: &mut Vec<NoteTransition>, now: Tick) {
        let notes = song.notes();
        let playing = self.playing.as_mut().unwrap();
        let next_index = playing.note_index + 1;

        if next_index >= notes.len() {
            self.playing = None;
            transitions.push(NoteTransition {
                song,
                action: SongAction::SongStop,
                note_freq_hz: 0,
            });
            if let Some(t) = self.maybe_start_next(now) {
                transitions.push(t);
            }
            return;
        }

        let next = notes[next_index];
        let duration = note_duration_ms(song.tempo(), next);
        playing.note_index = next_index;
        playing.phase = Phase::PlayingNote;
        playing.next_transition_at = crate::time::future(now, duration);
        if !next.is_rest() {
            transitions.push(NoteTransition {
                song,
                action: SongAction::ToneStart,
                note_freq_hz: next.freq_hz,
            });
        }
    }

    /// Applies one touch-sense transition while in touch-to-tone mode (no
    /// effect while a song is playing or touch-to-tone is disabled, per
    /// `spec.md` §4.14: "During touch-mode (not in a song)…").
    pub fn on_touch_sense(
        &mut self,
        variant_table: &[u16; NUM_ELECTRODES],
        electrode: usize,
        state: TouchState,
    ) -> Option<NoteTransition> {
        if !self.touch_to_tone_enabled || self.playing.is_some() {
            return None;
        }

        let touched = matches!(
            state,
            TouchState::Touched
                | TouchState::ShortPressed
                | TouchState::LongPressed
                | TouchState::VeryLongPressed
        );

        if touched && !self.touch_tone_active[electrode] {
            self.touch_tone_active[electrode] = true;
            let freq = shift_octave(variant_table[electrode], self.octave_shift);
            Some(NoteTransition {
                song: Song::ChestSound, // placeholder tag; touch tones have no owning song
                action: SongAction::ToneStart,
                note_freq_hz: freq,
            })
        } else if !touched && self.touch_tone_active[electrode] {
            self.touch_tone_active[electrode] = false;
            let freq = shift_octave(variant_table[electrode], self.octave_shift);
            Some(NoteTransition {
                song: Song::ChestSound,
                action: SongAction::ToneStop,
                note_freq_hz: freq,
            })
        } else {
            None
        }
    }
}

impl Default for SynthEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Shifts `freq_hz` by `shift` octaves (each octave doubles/halves
/// frequency), used for the interactive-game characteristic's second-octave
/// touch-to-tone mapping (`spec.md` §4.9.2).
pub fn shift_octave(freq_hz: u16, shift: i8) -> u16 {
    if shift >= 0 {
        freq_hz.saturating_mul(1 << shift.min(4))
    } else {
        freq_hz >> (-shift).min(4)
    }
}

/// Placeholder per-hardware-variant electrode→frequency table (`spec.md`
/// §4.14's touch-to-tone map), a diatonic scale across the 9 electrodes.
pub const DEFAULT_ELECTRODE_FREQUENCY_TABLE: [u16; NUM_ELECTRODES] =
    [262, 294, 330, 349, 392, 440, 494, 523, 587];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_duration_matches_formula() {
        // quarter note (sixteenths=4) at 60 bpm should last exactly 1000ms.
        let note = Note::new(440, 4);
        assert_eq!(note_duration_ms(60, note), 1_000);
    }

    #[test]
    fn queue_rejects_past_capacity() {
        let mut queue = SongQueue::new();
        for _ in 0..SONG_QUEUE_CAPACITY {
            queue.push(Song::Fanfare).unwrap();
        }
        assert_eq!(queue.push(Song::Fanfare), Err(SongQueueError::Full));
    }

    #[test]
    fn playing_song_has_priority_over_next_dequeue() {
        let mut engine = SynthEngine::new();
        let first = engine.play_song(Song::SuccessSound, 0).unwrap();
        assert!(first.is_some());
        let second = engine.play_song(Song::ChestSound, 0).unwrap();
        assert!(second.is_none(), "second song must queue, not preempt");
        assert!(engine.is_song_playing());
    }

    #[test]
    fn song_completes_and_starts_next_queued_song() {
        let mut engine = SynthEngine::new();
        engine.play_song(Song::ChestSound, 0).unwrap(); // 2 short notes
        engine.play_song(Song::SuccessSound, 0).unwrap();

        let mut now = 0;
        let mut saw_second_song_start = false;
        for _ in 0..50 {
            now += 50;
            let transitions = engine.tick(now);
            if transitions
                .iter()
                .any(|t| t.song == Song::SuccessSound && t.action == SongAction::SongStart)
            {
                saw_second_song_start = true;
                break;
            }
        }
        assert!(saw_second_song_start, "queued song must start once the first finishes");
    }

    #[test]
    fn touch_to_tone_disabled_produces_no_transitions() {
        let mut engine = SynthEngine::new();
        let transition =
            engine.on_touch_sense(&DEFAULT_ELECTRODE_FREQUENCY_TABLE, 0, TouchState::Touched);
        assert_eq!(transition, None);
    }

    #[test]
    fn touch_to_tone_emits_start_then_stop() {
        let mut engine = SynthEngine::new();
        engine.set_touch_to_tone(true, 0);
        let start =
            engine.on_touch_sense(&DEFAULT_ELECTRODE_FREQUENCY_TABLE, 3, TouchState::Touched);
        assert_eq!(start.unwrap().action, SongAction::ToneStart);
        let repeat =
            engine.on_touch_sense(&DEFAULT_ELECTRODE_FREQUENCY_TABLE, 3, TouchState::ShortPressed);
        assert_eq!(repeat, None, "already-active electrode must not refire ToneStart");
        let stop =
            engine.on_touch_sense(&DEFAULT_ELECTRODE_FREQUENCY_TABLE, 3, TouchState::Released);
        assert_eq!(stop.unwrap().action, SongAction::ToneStop);
    }

    #[test]
    fn touch_to_tone_silent_while_a_song_plays() {
        let mut engine = SynthEngine::new();
        engine.set_touch_to_tone(true, 0);
        engine.play_song(Song::Fanfare, 0).unwrap();
        let transition =
            engine.on_touch_sense(&DEFAULT_ELECTRODE_FREQUENCY_TABLE, 0, TouchState::Touched);
        assert_eq!(transition, None);
    }

    #[test]
    fn octave_shift_doubles_per_step() {
        assert_eq!(shift_octave(440, 1), 880);
        assert_eq!(shift_octave(440, -1), 220);
        assert_eq!(shift_octave(440, 0), 440);
    }
}
