//! Score buffer: ordered bars of notes plus tempo, time signature, loop flag
//! and end marker.
//!
//! The score is a plain value. The editor replaces whole bars rather than
//! mutating shared ones, and history keeps full clones of it, so a snapshot
//! is never affected by a later edit.

use crate::error::{ComposerError, Result};
use crate::settings::Settings;
use crate::types::*;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// One bar: up to three notes, optionally preceded by a tempo change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bar(Vec<BarEntry>);

impl Bar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_notes(notes: &[Note]) -> Self {
        Bar(notes.iter().copied().map(BarEntry::Note).collect())
    }

    pub fn entries(&self) -> &[BarEntry] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn notes(&self) -> impl Iterator<Item = Note> + '_ {
        self.0.iter().filter_map(|e| match e {
            BarEntry::Note(n) => Some(*n),
            BarEntry::Tempo(_) => None,
        })
    }

    pub fn note_count(&self) -> usize {
        self.notes().count()
    }

    /// True when the bar holds at least one real note (a lone tempo change
    /// does not count). Drives the character's jump.
    pub fn has_notes(&self) -> bool {
        self.notes().next().is_some()
    }

    pub fn is_full(&self) -> bool {
        self.note_count() >= MAX_NOTES_PER_BAR
    }

    pub fn contains(&self, note: Note) -> bool {
        self.notes().any(|n| n == note)
    }

    /// Tempo change at slot 0, if any.
    pub fn tempo_marker(&self) -> Option<f64> {
        match self.0.first() {
            Some(BarEntry::Tempo(t)) => Some(*t),
            _ => None,
        }
    }

    /// Append a note. Refuses once the bar is at the channel limit.
    pub fn push_note(&mut self, note: Note) -> bool {
        if self.is_full() {
            return false;
        }
        self.0.push(BarEntry::Note(note));
        true
    }

    /// Remove the most recently added note on `row`. Returns the removed note.
    pub fn remove_top_in_row(&mut self, row: u8) -> Option<Note> {
        let idx = self.0.iter().rposition(|e| match e {
            BarEntry::Note(n) => n.row() == row,
            BarEntry::Tempo(_) => false,
        })?;
        match self.0.remove(idx) {
            BarEntry::Note(n) => Some(n),
            BarEntry::Tempo(_) => None,
        }
    }

    /// Put a tempo change at slot 0, replacing an existing one.
    pub fn set_tempo_marker(&mut self, tempo: f64) {
        match self.0.first_mut() {
            Some(BarEntry::Tempo(t)) => *t = tempo,
            _ => self.0.insert(0, BarEntry::Tempo(tempo)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub notes: Vec<Bar>,
    #[serde(default)]
    pub beats: Beats,
    /// Beats per minute. 0 means "unset" (freshly reset, nothing imported).
    #[serde(default, deserialize_with = "deserialize_tempo")]
    pub tempo: f64,
    #[serde(default, rename = "loop")]
    pub looping: bool,
    /// Index of the last playable bar; also the loop point.
    #[serde(default)]
    pub end: usize,
}

impl Default for Score {
    fn default() -> Self {
        Self {
            notes: Vec::new(),
            beats: Beats::Four,
            tempo: 0.0,
            looping: false,
            end: 0,
        }
    }
}

impl Score {
    /// A blank score of `default_max_bars` empty bars.
    pub fn blank(settings: &Settings) -> Self {
        let mut score = Score::default();
        score.init(settings);
        score
    }

    /// Fill with empty bars and restore default tempo, beats and loop.
    pub fn init(&mut self, settings: &Settings) {
        let bars = settings.default_max_bars.max(1);
        self.notes = vec![Bar::new(); bars];
        self.looping = false;
        self.end = bars - 1;
        self.tempo = settings.default_tempo;
        self.beats = Beats::Four;
    }

    /// Empty the score ahead of an import. The loop flag is kept.
    pub fn reset(&mut self) {
        self.notes.clear();
        self.beats = Beats::Four;
        self.end = 0;
        self.tempo = 0.0;
    }

    pub fn bar(&self, index: usize) -> Option<&Bar> {
        self.notes.get(index)
    }

    /// Replace bar `index`, growing the score with empty bars if needed.
    pub fn put_bar(&mut self, index: usize, bar: Bar) {
        if index < self.notes.len() {
            self.notes[index] = bar;
        } else {
            self.notes.resize(index, Bar::new());
            self.notes.push(bar);
        }
    }

    /// Grow the score so that `end < notes.len()`.
    pub fn pad_to_end(&mut self) {
        if self.notes.len() <= self.end {
            self.notes.resize(self.end + 1, Bar::new());
        }
    }

    /// Write `bars` starting at the current end, advance `end` by `end_delta`
    /// and adopt `tempo`. When the score already had a tempo and it differs,
    /// the first imported bar gets a tempo change so playback switches speed
    /// there.
    ///
    /// Fails without touching the score when the new end would pass
    /// [`MAX_SCORE_BARS`].
    pub fn append(&mut self, bars: impl IntoIterator<Item = Bar>, end_delta: usize, tempo: f64) -> Result<()> {
        let old_end = self.end;
        let new_end = old_end
            .checked_add(end_delta)
            .filter(|&e| e <= MAX_SCORE_BARS)
            .ok_or_else(|| ComposerError::InvalidValue {
                key: "END",
                value: format!("{} + {}", old_end, end_delta),
            })?;
        let requested = tempo;
        let tempo = clamp_tempo(tempo);
        if tempo != requested {
            warn!("Tempo {} out of range, using {}", format_tempo(requested), format_tempo(tempo));
        }

        let mut written = 0;
        for (k, bar) in bars.into_iter().enumerate() {
            self.put_bar(old_end + k, bar);
            written += 1;
        }
        self.end = new_end;
        self.pad_to_end();
        if self.tempo > 0.0 && self.tempo != tempo {
            if let Some(bar) = self.notes.get_mut(old_end) {
                bar.set_tempo_marker(tempo);
                debug!("Tempo change {} -> {} at bar {}", self.tempo, tempo, old_end);
            }
        }
        self.tempo = tempo;
        debug!("Appended {} bars at {}, end now {}", written, old_end, self.end);
        Ok(())
    }

    /// If bar 0 opens with a tempo change, make it the score tempo.
    pub fn sync_tempo_from_first_bar(&mut self) {
        if let Some(t) = self.notes.first().and_then(Bar::tempo_marker) {
            self.tempo = t;
        }
    }

    /// Total real notes in the score.
    pub fn note_count(&self) -> usize {
        self.notes.iter().map(Bar::note_count).sum()
    }

    /// Check `end < notes.len()` and the per-bar channel limit.
    pub fn is_consistent(&self) -> bool {
        self.end < self.notes.len() && self.notes.iter().all(|b| b.note_count() <= MAX_NOTES_PER_BAR)
    }
}
