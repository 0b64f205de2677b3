//! Sound bank seam and note scheduling.
//!
//! Every instrument is a single sample pitched by playback rate. A bank
//! implementation owns decoding and output; this module only decides which
//! samples start, at what rate and after what delay.

use crate::score::Bar;
use crate::types::*;
use log::{debug, info, trace, warn};
use std::collections::BTreeMap;

/// Semitone offset from the sample's recorded pitch for each scale row.
/// Row 0 is the top of the staff (G5), row 8 the sample pitch (F4),
/// row 11 middle C and row 12 B3.
pub const SEMITONE_TABLE: [i32; 13] = [14, 12, 11, 9, 7, 6, 4, 2, 0, -1, -3, -5, -6];

/// MIDI note of an unshifted sample (row 8).
pub const SAMPLE_MIDI_NOTE: i32 = 65;

/// Sample slots after the instruments: interface sound effects.
pub const SFX_END_MARK: u8 = 15;
pub const SFX_ERASE: u8 = 17;
pub const SFX_UNDO: u8 = 18;
pub const SFX_CLEAR: u8 = 19;

/// Pitch byte of the unshifted sample (row 8, F4). Used for previews and
/// sound effects.
pub const PREVIEW_PITCH: u8 = 8;

/// Sample names by slot. Slot 16 is unused.
pub const SAMPLE_NAMES: [&str; 20] = [
    "mario", "mushroom", "yoshi", "star", "flower", "gameboy", "dog", "cat", "pig", "swan",
    "face", "plane", "boat", "car", "heart", "end-mark", "", "erase", "undo", "clear",
];

pub fn instrument_name(instrument: u8) -> &'static str {
    match SAMPLE_NAMES.get(instrument as usize) {
        Some(name) if !name.is_empty() => *name,
        _ => "unknown",
    }
}

/// Semitone shift for a pitch byte (scale row plus sharp/flat bits).
/// None for rows the staff does not have.
pub fn semitone_offset(pitch: u8) -> Option<i32> {
    let base = *SEMITONE_TABLE.get((pitch & 0x0F) as usize)?;
    let shift = if pitch as u16 & Note::SHARP != 0 {
        1
    } else if pitch as u16 & Note::FLAT != 0 {
        -1
    } else {
        0
    };
    Some(base + shift)
}

pub fn playback_rate(pitch: u8) -> Option<f64> {
    semitone_offset(pitch).map(|s| 2f64.powf(s as f64 / 12.0))
}

pub fn note_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    match semitone_offset(pitch) {
        Some(s) => {
            let midi = SAMPLE_MIDI_NOTE + s;
            format!("{}{}", NAMES[midi.rem_euclid(12) as usize], midi.div_euclid(12) - 1)
        }
        None => "---".to_string(),
    }
}

/// Playable instrument samples.
pub trait SoundBank {
    /// False when no sample is loaded for `instrument`; such notes are skipped.
    fn has_sample(&self, instrument: u8) -> bool;

    /// Start one note `delay_secs` from now.
    fn play(&mut self, instrument: u8, pitch: u8, delay_secs: f64);

    /// Start a chord on one instrument, cutting whatever that instrument
    /// was still sounding.
    fn play_chord(&mut self, instrument: u8, pitches: &[u8], delay_secs: f64);
}

impl<B: SoundBank + ?Sized> SoundBank for Box<B> {
    fn has_sample(&self, instrument: u8) -> bool {
        (**self).has_sample(instrument)
    }
    fn play(&mut self, instrument: u8, pitch: u8, delay_secs: f64) {
        (**self).play(instrument, pitch, delay_secs)
    }
    fn play_chord(&mut self, instrument: u8, pitches: &[u8], delay_secs: f64) {
        (**self).play_chord(instrument, pitches, delay_secs)
    }
}

/// Sound every note of `bar`, one chord per instrument in ascending
/// instrument order. Returns the tempo change carried by the bar, if any.
pub fn schedule_and_play<S: SoundBank + ?Sized>(bank: &mut S, bar: &Bar, delay_ms: f64) -> Option<f64> {
    let delay_secs = delay_ms.max(0.0) / 1000.0;
    let mut tempo = None;
    let mut chords: BTreeMap<u8, Vec<u8>> = BTreeMap::new();

    for entry in bar.entries() {
        match entry {
            BarEntry::Tempo(t) => tempo = Some(*t),
            BarEntry::Note(n) => chords.entry(n.instrument()).or_default().push(n.pitch()),
        }
    }

    for (instrument, pitches) in &chords {
        if bank.has_sample(*instrument) {
            bank.play_chord(*instrument, pitches, delay_secs);
        } else {
            debug!("No sample for instrument {}, skipping {} notes", instrument, pitches.len());
        }
    }
    tempo
}

// ─── Logging bank ───────────────────────────────────────────────────────────

/// A bank that produces no audio and logs each note instead. Keeps the
/// per-instrument voice bookkeeping a real bank would.
pub struct LogSoundBank {
    sounding: Vec<Vec<u8>>,
    notes_played: usize,
    voices_cut: usize,
}

impl LogSoundBank {
    pub fn new() -> Self {
        Self {
            sounding: vec![Vec::new(); SAMPLE_NAMES.len()],
            notes_played: 0,
            voices_cut: 0,
        }
    }

    pub fn notes_played(&self) -> usize {
        self.notes_played
    }

    pub fn voices_cut(&self) -> usize {
        self.voices_cut
    }

    fn start(&mut self, instrument: u8, pitch: u8, delay_secs: f64) -> bool {
        let Some(rate) = playback_rate(pitch) else {
            warn!("{}: row {} is off the staff, not playing", instrument_name(instrument), pitch & 0x0F);
            return false;
        };
        self.notes_played += 1;
        info!(
            "♪ {:<8} {:<4} rate {:.3} +{:.3}s",
            instrument_name(instrument),
            note_name(pitch),
            rate,
            delay_secs
        );
        true
    }
}

impl Default for LogSoundBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundBank for LogSoundBank {
    fn has_sample(&self, instrument: u8) -> bool {
        instrument_name(instrument) != "unknown"
    }

    fn play(&mut self, instrument: u8, pitch: u8, delay_secs: f64) {
        self.start(instrument, pitch, delay_secs);
    }

    fn play_chord(&mut self, instrument: u8, pitches: &[u8], delay_secs: f64) {
        let Some(voices) = self.sounding.get_mut(instrument as usize) else {
            return;
        };
        if !voices.is_empty() {
            trace!("{}: cutting {} voices", instrument_name(instrument), voices.len());
            self.voices_cut += voices.len();
            voices.clear();
        }
        let mut started = Vec::with_capacity(pitches.len());
        for &p in pitches {
            if self.start(instrument, p, delay_secs) {
                started.push(p);
            }
        }
        self.sounding[instrument as usize] = started;
    }
}
