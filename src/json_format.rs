//! JSON score documents: `{"notes": [[...], ...], "end", "tempo", "beats", "loop"}`.
//!
//! Export writes the live score verbatim. Import appends `notes[0..end)` at
//! the current end of the score and advances `end` by the document's `end`.

use crate::error::{ComposerError, Result};
use crate::score::{Bar, Score};
use crate::types::MAX_SCORE_BARS;
use log::info;

/// Parse a JSON score and append it to `score`.
pub fn import(score: &mut Score, text: &str) -> Result<()> {
    let doc: Score = serde_json::from_str(text)?;
    if doc.end > MAX_SCORE_BARS {
        return Err(ComposerError::InvalidValue {
            key: "end",
            value: doc.end.to_string(),
        });
    }
    let take = doc.end.min(doc.notes.len());
    let bars: Vec<Bar> = doc.notes.into_iter().take(take).collect();
    score.append(bars, doc.end, doc.tempo)?;
    score.beats = doc.beats;
    score.looping = doc.looping;
    info!(
        "Imported JSON score: {} bars, end {}, loop {}",
        take, score.end, score.looping
    );
    Ok(())
}

pub fn export(score: &Score, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(score)?
    } else {
        serde_json::to_string(score)?
    };
    Ok(json)
}
