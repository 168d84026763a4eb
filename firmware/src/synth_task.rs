//! Synth/song task and ocarina matcher, wired to the PWM buzzer.
//!
//! Grounded on `spec.md` §4.14/§4.15, `original_source/main/src/SynthMode.c`'s
//! task loop, and `badge_core::audio::SynthEngine` /
//! `badge_core::ocarina::OcarinaMatcher`, which own the actual timing and
//! pattern-match logic; this module is the `firmware`-crate glue that turns
//! `TouchSense`/`PlaySong` bus events into engine calls, ticks the engine
//! every note-gap-sized interval, and drives the real `Buzzer` + LED
//! `song` mode the way `coordinator_task.rs` drives the LED pipeline from
//! `Coordinator` effects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use badge_core::audio::{NoteTransition, SynthEngine, DEFAULT_ELECTRODE_FREQUENCY_TABLE};
use badge_core::event::Event;
use badge_core::hal::Buzzer;
use badge_core::led::pipeline::RenderPipeline;
use badge_core::ocarina::{melody_table, OcarinaMatcher};
use badge_core::songs::SongAction;
use badge_core::touch::TouchState;
use badge_core::Bus;
use esp_idf_hal::delay::FreeRtos;
use log::*;

const TICK_MS: u32 = 20;

pub struct SynthTask {
    engine: Mutex<SynthEngine>,
    ocarina: Mutex<OcarinaMatcher>,
    buzzer: Mutex<Box<dyn Buzzer>>,
    pipeline: Arc<Mutex<RenderPipeline>>,
    ocarina_enabled: AtomicBool,
    bus: Bus,
}

impl SynthTask {
    pub fn new(buzzer: Box<dyn Buzzer>, pipeline: Arc<Mutex<RenderPipeline>>, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            engine: Mutex::new(SynthEngine::new()),
            ocarina: Mutex::new(OcarinaMatcher::new(melody_table())),
            buzzer: Mutex::new(buzzer),
            pipeline,
            ocarina_enabled: AtomicBool::new(false),
            bus,
        })
    }

    /// `spec.md` §4.7's `ToggleSynthMode`: enables touch-to-tone (octave 0)
    /// and the ocarina matcher together.
    pub fn set_synth_mode(&self, enabled: bool) {
        self.engine.lock().unwrap().set_touch_to_tone(enabled, 0);
        self.ocarina_enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.ocarina.lock().unwrap().clear();
        }
    }

    /// Registers this task's bus subscriptions. Must be called before
    /// `Bus::start()`.
    pub fn subscribe(self: &Arc<Self>, bus: &Bus) {
        let this = self.clone();
        bus.subscribe(badge_core::EventKind::TouchSense, move |event| {
            if let Event::TouchSense { electrode, state } = event {
                this.on_touch_sense(*electrode, *state);
            }
        });

        let this = self.clone();
        bus.subscribe(badge_core::EventKind::PlaySong, move |event| {
            if let Event::PlaySong(song) = event {
                let now = crate::now_ms();
                match this.engine.lock().unwrap().play_song(*song, now) {
                    Ok(Some(transition)) => this.apply_transition(transition),
                    Ok(None) => {}
                    Err(e) => warn!("song queue rejected {:?}: {:?}", song, e),
                }
            }
        });
    }

    fn on_touch_sense(self: &Arc<Self>, electrode: usize, state: TouchState) {
        if self.ocarina_enabled.load(Ordering::Relaxed) && state == TouchState::Touched {
            let matched = self.ocarina.lock().unwrap().on_electrode_touched(electrode);
            if let Some(song_index) = matched {
                let _ = self.bus.notify(Event::OcarinaSongMatched(song_index), Duration::from_millis(50));
            }
        }

        if let Some(transition) =
            self.engine.lock().unwrap().on_touch_sense(&DEFAULT_ELECTRODE_FREQUENCY_TABLE, electrode, state)
        {
            self.apply_transition(transition);
        }
    }

    fn apply_transition(self: &Arc<Self>, transition: NoteTransition) {
        let mut buzzer = self.buzzer.lock().unwrap();
        let result = match transition.action {
            SongAction::ToneStart => buzzer.tone(transition.note_freq_hz),
            SongAction::ToneStop => buzzer.stop(),
            SongAction::SongStart => {
                self.pipeline.lock().unwrap().set_song(0);
                Ok(())
            }
            SongAction::SongStop => buzzer.stop(),
        };
        drop(buzzer);
        if let Err(e) = result {
            warn!("buzzer action failed: {:?}", e);
        }
        let _ = self.bus.notify(
            Event::SongNoteAction {
                song: transition.song,
                action: transition.action,
                note_freq_hz: transition.note_freq_hz,
            },
            Duration::from_millis(50),
        );
    }

    /// Run on its own thread, ticking the note/gap state machine every
    /// `TICK_MS`; `spec.md` §5 lists this as a "per-note" triggered task, but
    /// a short fixed tick is the idiomatic way to drive tick-based state
    /// without a dedicated per-note timer per platform.
    pub fn run(self: Arc<Self>) -> ! {
        loop {
            let now = crate::now_ms();
            let transitions = self.engine.lock().unwrap().tick(now);
            for transition in transitions {
                self.apply_transition(transition);
            }
            FreeRtos::delay_ms(TICK_MS);
        }
    }
}
