use serde::{Deserialize, Deserializer, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt;

// ─── Grid geometry (logical pixels, before magnification) ──────────────────

/// Width of one bar column. The character advances this far per beat.
pub const BAR_WIDTH: f64 = 32.0;
/// Half a bar: the point where a centred character lands on a note.
pub const HALF_BAR: f64 = 16.0;
/// Number of grid columns in the visible window.
pub const VISIBLE_COLUMNS: usize = 9;
/// Columns 0 and 1 hold the clef and repeat head while `bar_pos` < 2.
pub const RESERVED_COLUMNS: usize = 2;
/// Horizontal centre of the viewport. The character is held here while the
/// score scrolls underneath it.
pub const CENTER_X: f64 = 120.0;
/// Character x while still off-screen on the left.
pub const ENTRY_X: f64 = -16.0;
/// Character x at the left edge of the grid (16 + 32 - 8).
pub const PLAY_START_X: f64 = 40.0;
/// Character x at which the leaving walk is complete.
pub const EXIT_X: f64 = 247.0;
/// Scrolling stops once `bar_pos` is within this many bars of `end`.
pub const TAIL_BARS: usize = 6;
/// Character sprite top, in logical pixels.
pub const RUNNER_Y: f64 = 41.0 - 22.0;

/// Editable score rectangle, inclusive.
pub const GRID_LEFT: f64 = 8.0;
pub const GRID_TOP: f64 = 41.0;
pub const GRID_RIGHT: f64 = 247.0;
pub const GRID_BOTTOM: f64 = 148.0;
/// Rows at or below this one sit under middle C and get a ledger line.
pub const LEDGER_ROW: u8 = 11;

/// Hardware channel limit: notes per bar.
pub const MAX_NOTES_PER_BAR: usize = 3;
/// Instruments selectable from the palette (tool indices 0..15).
pub const INSTRUMENT_COUNT: u8 = 15;
/// Upper bound on a score's end marker. Imports past it are rejected.
pub const MAX_SCORE_BARS: usize = 10_000;

/// Tempo slider range.
pub const TEMPO_MIN: f64 = 50.0;
pub const TEMPO_MAX: f64 = 1000.0;

// ─── Packed notes ───────────────────────────────────────────────────────────

/// A note packed the way scores store it:
/// bits 0–3 scale row, bit 6 flat, bit 7 sharp, bits 8–15 instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Note(pub u16);

impl Note {
    pub const FLAT: u16 = 0x40;
    pub const SHARP: u16 = 0x80;

    pub fn new(instrument: u8, scale: u8) -> Self {
        Note(((instrument as u16) << 8) | (scale as u16 & 0x0F))
    }

    pub fn scale(self) -> u8 {
        (self.0 & 0x0F) as u8
    }

    /// Scale row plus the semitone-free low bits; used to match erase targets.
    pub fn row(self) -> u8 {
        (self.0 & 0x3F) as u8
    }

    /// Low byte as handed to the sound bank (scale + semitone bits).
    pub fn pitch(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn instrument(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn is_sharp(self) -> bool {
        self.0 & Self::SHARP != 0
    }

    pub fn is_flat(self) -> bool {
        self.0 & Self::FLAT != 0
    }

    pub fn with_sharp(self) -> Self {
        Note((self.0 & !Self::FLAT) | Self::SHARP)
    }

    pub fn with_flat(self) -> Self {
        Note((self.0 & !Self::SHARP) | Self::FLAT)
    }

    /// Drop semitone bits, keeping instrument and row.
    pub fn natural(self) -> Self {
        Note(self.0 & !(Self::SHARP | Self::FLAT))
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accidental = if self.is_sharp() {
            "#"
        } else if self.is_flat() {
            "b"
        } else {
            ""
        };
        write!(f, "i{}:r{}{}", self.instrument(), self.scale(), accidental)
    }
}

// ─── Bar entries ────────────────────────────────────────────────────────────

/// One slot of a bar: a packed note or an inline tempo change.
/// On the wire a note is an integer and a tempo change is `"TEMPO=<n>"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEntry", into = "RawEntry")]
pub enum BarEntry {
    Note(Note),
    Tempo(f64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Packed(u16),
    Marker(String),
}

impl TryFrom<RawEntry> for BarEntry {
    type Error = String;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        match raw {
            RawEntry::Packed(n) => Ok(BarEntry::Note(Note(n))),
            RawEntry::Marker(s) => parse_tempo_marker(&s)
                .map(BarEntry::Tempo)
                .ok_or_else(|| format!("unrecognised bar entry {:?}", s)),
        }
    }
}

impl From<BarEntry> for RawEntry {
    fn from(entry: BarEntry) -> Self {
        match entry {
            BarEntry::Note(n) => RawEntry::Packed(n.0),
            BarEntry::Tempo(t) => RawEntry::Marker(tempo_marker(t)),
        }
    }
}

/// Parse `"TEMPO=<n>"`. Returns None for anything else.
pub fn parse_tempo_marker(s: &str) -> Option<f64> {
    let value = s.strip_prefix("TEMPO=")?;
    value.trim().parse::<f64>().ok()
}

pub fn tempo_marker(tempo: f64) -> String {
    format!("TEMPO={}", format_tempo(tempo))
}

/// Pull a playable tempo into the slider range. Zero, negative and
/// non-finite values are passed through untouched; the engine treats them
/// as a stall.
pub fn clamp_tempo(tempo: f64) -> f64 {
    if tempo.is_finite() && tempo > 0.0 {
        tempo.clamp(TEMPO_MIN, TEMPO_MAX)
    } else {
        tempo
    }
}

/// Tempo as written at text boundaries: integral values without a fraction.
pub fn format_tempo(tempo: f64) -> String {
    if tempo.fract() == 0.0 && tempo.abs() < 1e15 {
        format!("{}", tempo as i64)
    } else {
        format!("{}", tempo)
    }
}

/// Accepts a tempo stored either as a JSON number or a numeric string.
pub fn deserialize_tempo<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(f64),
        Text(String),
    }

    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("tempo is not numeric: {:?}", s))),
    }
}

// ─── Time signature ─────────────────────────────────────────────────────────

/// Beats per measure. Only 3/4 and 4/4 exist; serialised as 3 or 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Beats {
    Three = 3,
    #[default]
    Four = 4,
}

impl Beats {
    pub fn count(self) -> usize {
        self as usize
    }
}

// ─── Session enums ──────────────────────────────────────────────────────────

/// Playback state machine. Cycles Edit → Entering → Playing → Leaving → Edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameStatus {
    #[default]
    Edit,
    Entering,
    Playing,
    Leaving,
}

/// Selected palette tool. Index 15 is the end mark, 16 the eraser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Instrument(u8),
    EndMark,
    Eraser,
}

impl Tool {
    pub const END_MARK_INDEX: u8 = 15;
    pub const ERASER_INDEX: u8 = 16;

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            i if i < INSTRUMENT_COUNT => Some(Tool::Instrument(i)),
            Self::END_MARK_INDEX => Some(Tool::EndMark),
            Self::ERASER_INDEX => Some(Tool::Eraser),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Tool::Instrument(i) => i,
            Tool::EndMark => Self::END_MARK_INDEX,
            Tool::Eraser => Self::ERASER_INDEX,
        }
    }
}

impl Default for Tool {
    fn default() -> Self {
        Tool::Instrument(0)
    }
}

/// Which pointer button produced a click. Secondary always erases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// Keyboard modifiers held during a click: shift = sharp, ctrl = flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
}
