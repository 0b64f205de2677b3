//! MSQ score text: five `KEYWORD=value` lines in the fixed order
//! SCORE, TEMPO, LOOP, END, TIME44.
//!
//! SCORE is a run of hex digits. Each bar has up to three slots; a `0` digit is
//! an empty slot, any other digit is `scale+1` followed by an `instrument+1`
//! digit. Bars may be separated by `\r`. The share encoding writes exactly
//! three slots per bar followed by `\r`.

use crate::error::{ComposerError, Result};
use crate::score::{Bar, Score};
use crate::types::*;
use log::{debug, info, warn};

pub const KEYWORDS: [&str; 5] = ["SCORE", "TEMPO", "LOOP", "END", "TIME44"];

/// Bar separator inside the SCORE value.
const BAR_SEPARATOR: char = '\r';

/// A parsed MSQ document, not yet merged into a score.
#[derive(Debug, Clone, PartialEq)]
pub struct MsqSong {
    pub bars: Vec<Bar>,
    pub tempo: f64,
    pub looping: bool,
    /// Raw END value. Import advances the score end by `end - 1`.
    pub end: usize,
    pub beats: Beats,
}

impl MsqSong {
    pub fn parse(text: &str) -> Result<Self> {
        let mut values: [Option<&str>; 5] = [None; 5];
        for (i, line) in split_lines(text).filter(|l| !l.is_empty()).enumerate() {
            let (key, value) = line.split_once('=').unwrap_or((line, ""));
            if i < KEYWORDS.len() {
                if key != KEYWORDS[i] {
                    return Err(ComposerError::Format {
                        line: i,
                        expected: KEYWORDS[i],
                    });
                }
                values[i] = Some(value);
            } else {
                debug!("Ignoring trailing MSQ line {}: {:?}", i, key);
            }
        }

        let [score, tempo, looping, end, time44] = values;
        let score = score.ok_or(ComposerError::MissingField("SCORE"))?;
        let tempo = parse_number("TEMPO", tempo.ok_or(ComposerError::MissingField("TEMPO"))?)?;
        let end = end.ok_or(ComposerError::MissingField("END"))?;
        let end = end
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|&e| e <= MAX_SCORE_BARS)
            .ok_or_else(|| ComposerError::InvalidValue {
                key: "END",
                value: end.to_string(),
            })?;

        Ok(MsqSong {
            bars: parse_score_digits(score)?,
            tempo,
            looping: looping.map(|v| v.trim() == "TRUE").unwrap_or(false),
            end,
            beats: if time44.map(str::trim) == Some("TRUE") {
                Beats::Four
            } else {
                Beats::Three
            },
        })
    }

    /// Merge into `score` at its current end. The loop flag and time
    /// signature are taken from the song.
    pub fn import_into(self, score: &mut Score) -> Result<()> {
        let bar_count = self.bars.len();
        score.append(self.bars, self.end.saturating_sub(1), self.tempo)?;
        score.beats = self.beats;
        score.looping = self.looping;
        info!(
            "Imported MSQ: {} bars, tempo {}, end {}, loop {}",
            bar_count,
            format_tempo(score.tempo),
            score.end,
            score.looping
        );
        Ok(())
    }
}

/// Parse MSQ text and append it to `score`.
pub fn import(score: &mut Score, text: &str) -> Result<()> {
    MsqSong::parse(text)?.import_into(score)
}

fn split_lines(text: &str) -> Box<dyn Iterator<Item = &str> + '_> {
    if text.contains('\n') {
        Box::new(text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)))
    } else {
        Box::new(text.split('\r'))
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<f64> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ComposerError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

/// Decode the SCORE digit string into bars.
///
/// A separator at the start of a bar ends the score, as does the end of the
/// input. A bar cut short by the end of input is kept.
pub fn parse_score_digits(s: &str) -> Result<Vec<Bar>> {
    let chars: Vec<char> = s.chars().collect();
    let mut bars = Vec::new();
    let mut i = 0;

    while i < chars.len() && chars[i] != BAR_SEPARATOR {
        let mut bar = Bar::new();
        for _ in 0..MAX_NOTES_PER_BAR {
            let Some(&c) = chars.get(i) else { break };
            if c == BAR_SEPARATOR {
                break;
            }
            let scale = hex_digit(c, i)?;
            i += 1;
            if scale == 0 {
                continue;
            }
            let tone = match chars.get(i) {
                Some(&t) if t != BAR_SEPARATOR => hex_digit(t, i)?,
                _ => return Err(ComposerError::TruncatedNote { offset: i - 1 }),
            };
            i += 1;
            if tone == 0 {
                warn!("Note at offset {} has instrument digit 0, skipping", i - 1);
                continue;
            }
            bar.push_note(Note::new(tone - 1, scale - 1));
        }
        bars.push(bar);
        if chars.get(i) == Some(&BAR_SEPARATOR) {
            i += 1;
        }
    }

    Ok(bars)
}

fn hex_digit(c: char, offset: usize) -> Result<u8> {
    c.to_digit(16)
        .map(|d| d as u8)
        .ok_or(ComposerError::InvalidDigit { offset, found: c })
}

// ─── Encoding ───────────────────────────────────────────────────────────────

/// Encode every bar as three slots plus a separator.
///
/// Tempo changes have no MSQ form and are skipped. Semitone bits are dropped,
/// and notes whose row or instrument do not fit in a hex digit are left out.
pub fn encode_score_digits(score: &Score) -> String {
    let mut s = String::with_capacity(score.notes.len() * 7);
    for (b, bar) in score.notes.iter().enumerate() {
        let mut slots = 0;
        for note in bar.notes().take(MAX_NOTES_PER_BAR) {
            if note.is_sharp() || note.is_flat() {
                warn!("Bar {}: semitone on {} cannot be shared, dropping it", b, note);
            }
            let scale = note.scale() as u32 + 1;
            let tone = note.instrument() as u32 + 1;
            if scale > 15 || tone > 15 {
                warn!("Bar {}: note {} cannot be shared, skipping", b, note);
                continue;
            }
            // Both values are 1..=15 here.
            s.push(char::from_digit(scale, 16).unwrap_or('0'));
            s.push(char::from_digit(tone, 16).unwrap_or('0'));
            slots += 1;
        }
        for _ in slots..MAX_NOTES_PER_BAR {
            s.push('0');
        }
        s.push(BAR_SEPARATOR);
    }
    s
}

/// Full MSQ text for `score`. END is written so that importing into a reset
/// score restores the same end marker.
pub fn to_msq_text(score: &Score) -> String {
    format!(
        "SCORE={}\nTEMPO={}\nLOOP={}\nEND={}\nTIME44={}",
        encode_score_digits(score),
        format_tempo(score.tempo),
        bool_word(score.looping),
        score.end + 1,
        bool_word(score.beats == Beats::Four)
    )
}

/// Query string carrying the whole score inline: `S`, `T`, `L`, `E`, `B`.
pub fn share_query(score: &Score) -> String {
    let digits = encode_score_digits(score).replace(BAR_SEPARATOR, "%0D");
    format!(
        "S={}&T={}&L={}&E={}&B={}",
        digits,
        format_tempo(score.tempo),
        bool_flag(score.looping),
        score.end + 1,
        bool_flag(score.beats == Beats::Four)
    )
}

fn bool_word(b: bool) -> &'static str {
    if b {
        "TRUE"
    } else {
        "FALSE"
    }
}

fn bool_flag(b: bool) -> &'static str {
    if b {
        "T"
    } else {
        "F"
    }
}
