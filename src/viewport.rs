//! Visible window of the score.
//!
//! The window is nine columns wide. Column `i` shows bar `bar_pos + i - 2`
//! with its origin at `16 + 32*i - scroll`. While `bar_pos` is 0 or 1 the
//! leading columns hold the clef and repeat head instead of bars.

use crate::engine::TimingEngine;
use crate::score::Score;
use crate::settings::Settings;
use crate::types::*;

/// Column index (mod beats) drawn as a measure start.
pub fn accent_residue(beats: Beats, bar_pos: usize) -> usize {
    match beats {
        Beats::Four => 3 - ((bar_pos + 1) % 4),
        Beats::Three => 2 - ((bar_pos + 3) % 3),
    }
}

/// Logical x of column `i`'s bar line.
pub fn column_x(i: usize, scroll: f64) -> f64 {
    HALF_BAR + BAR_WIDTH * i as f64 - scroll
}

/// First column that shows a bar.
pub fn first_bar_column(bar_pos: usize) -> usize {
    RESERVED_COLUMNS.saturating_sub(bar_pos)
}

/// A pointer position resolved to an editable cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    /// Visible column, 0..9.
    pub x: usize,
    /// Pitch row.
    pub y: u8,
}

impl GridCell {
    /// Absolute bar under this cell.
    pub fn bar(&self, bar_pos: usize) -> Option<usize> {
        (bar_pos + self.x).checked_sub(RESERVED_COLUMNS)
    }
}

/// Map a pointer position (screen pixels, relative to the top-left of the
/// display) to a grid cell. None outside the score area, between note
/// columns, or over the clef/repeat columns.
pub fn to_grid(real_x: f64, real_y: f64, settings: &Settings, bar_pos: usize) -> Option<GridCell> {
    let m = settings.magnify.max(1) as f64;
    let (left, top) = (GRID_LEFT * m, GRID_TOP * m);
    if real_x < left || real_x > GRID_RIGHT * m || real_y < top || real_y > GRID_BOTTOM * m {
        return None;
    }

    let gx = ((real_x - left) / settings.charsize()).floor() as usize;
    if gx % 2 != 0 {
        return None;
    }
    let gx = gx / 2;
    let gy = ((real_y - top) / settings.half_charsize()).floor() as u8;

    if (bar_pos == 0 && gx < 2) || (bar_pos == 1 && gx == 0) {
        return None;
    }
    Some(GridCell { x: gx, y: gy })
}

// ─── Forward projection ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndMarker {
    End,
    Repeat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteSprite {
    pub note: Note,
    /// Logical y of the sprite top, bounce included.
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    pub column: usize,
    pub bar: usize,
    pub x: f64,
    pub accent: bool,
    /// Measure number shown above accented columns in edit mode.
    pub measure: Option<usize>,
    pub marker: Option<EndMarker>,
    pub notes: Vec<NoteSprite>,
    /// A note sits on or below middle C.
    pub ledger: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    pub bar_pos: usize,
    pub scroll: f64,
    pub clef_x: Option<f64>,
    pub repeat_head_x: Option<f64>,
    pub columns: Vec<ColumnView>,
    /// Edit-mode hover cell and whether it needs a ledger line.
    pub hover: Option<GridCell>,
    pub hover_ledger: bool,
}

/// Per-frame state the projection depends on besides the score.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overlay<'a> {
    pub status: GameStatus,
    pub hover: Option<GridCell>,
    /// The eraser is selected and its blink is in the "hidden" phase.
    pub eraser_blink: bool,
    /// The character, while it is playing.
    pub runner: Option<&'a TimingEngine>,
}

pub fn project(score: &Score, bar_pos: usize, scroll: f64, overlay: &Overlay) -> Projection {
    let editing = overlay.status == GameStatus::Edit;
    let hover = if editing { overlay.hover } else { None };
    let beats = score.beats.count();
    let residue = accent_residue(score.beats, bar_pos);

    let (clef_x, repeat_head_x) = match bar_pos {
        0 => (Some(9.0 - scroll), score.looping.then_some(41.0 - scroll)),
        1 if score.looping => (None, Some(9.0 - scroll)),
        _ => (None, None),
    };

    let bouncing = match (overlay.status, overlay.runner) {
        (GameStatus::Playing, Some(r)) => Some(r),
        _ => None,
    };

    let mut columns = Vec::with_capacity(VISIBLE_COLUMNS);
    for i in first_bar_column(bar_pos)..VISIBLE_COLUMNS {
        let x = column_x(i, scroll);
        let bar = bar_pos + i - RESERVED_COLUMNS;
        let accent = i % beats == residue;

        let marker = (bar == score.end).then(|| {
            if score.looping {
                EndMarker::Repeat
            } else {
                EndMarker::End
            }
        });

        let mut view = ColumnView {
            column: i,
            bar,
            x,
            accent,
            measure: (accent && editing).then_some(bar / beats + 1),
            marker,
            notes: Vec::new(),
            ledger: false,
        };

        if let Some(b) = score.bar(bar) {
            let bounce = bouncing.map(|r| r.note_bounce(bar, x)).unwrap_or(0.0);
            for note in b.notes() {
                let scale = note.scale();
                let hidden = overlay.eraser_blink
                    && hover.map(|h| h.x == i && h.y == scale).unwrap_or(false);
                if hidden {
                    continue;
                }
                if scale >= LEDGER_ROW {
                    view.ledger = true;
                }
                view.notes.push(NoteSprite {
                    note,
                    y: 40.0 + scale as f64 * 8.0 + bounce,
                });
            }
        }
        columns.push(view);
    }

    Projection {
        bar_pos,
        scroll,
        clef_x,
        repeat_head_x,
        columns,
        hover,
        hover_ledger: hover.map(|h| h.y >= LEDGER_ROW).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::Bar;

    fn edit_overlay() -> Overlay<'static> {
        Overlay::default()
    }

    #[test]
    fn test_accent_residue_four_beats() {
        let seq: Vec<usize> = (0..8).map(|p| accent_residue(Beats::Four, p)).collect();
        assert_eq!(seq, vec![2, 1, 0, 3, 2, 1, 0, 3]);
    }

    #[test]
    fn test_accent_residue_three_beats() {
        let seq: Vec<usize> = (0..6).map(|p| accent_residue(Beats::Three, p)).collect();
        assert_eq!(seq, vec![2, 1, 0, 2, 1, 0]);
    }

    #[test]
    fn test_accented_columns_are_measure_starts() {
        let score = Score::blank(&Settings::default());
        for bar_pos in 0..12 {
            let p = project(&score, bar_pos, 0.0, &edit_overlay());
            for col in p.columns.iter().filter(|c| c.accent) {
                assert_eq!(col.bar % 4, 0, "bar_pos {}", bar_pos);
                assert_eq!(col.measure, Some(col.bar / 4 + 1));
            }
        }
    }

    #[test]
    fn test_to_grid_rejections() {
        let s = Settings::default();
        assert_eq!(to_grid(7.0, 90.0, &s, 0), None);
        assert_eq!(to_grid(9.0, 90.0, &s, 0), None);
        assert_eq!(to_grid(32.0, 90.0, &s, 5), None);
        assert_eq!(to_grid(8.0, 41.0, &s, 0), None);
        assert_eq!(to_grid(8.0, 41.0, &s, 1), None);
        assert_eq!(to_grid(8.0, 41.0, &s, 2), Some(GridCell { x: 0, y: 0 }));
        assert_eq!(to_grid(40.0, 41.0, &s, 1), Some(GridCell { x: 1, y: 0 }));
        assert_eq!(to_grid(100.0, 149.0, &s, 3), None);
    }

    #[test]
    fn test_to_grid_cell() {
        let s = Settings::default();
        let cell = to_grid(72.0, 90.0, &s, 0).unwrap();
        assert_eq!(cell, GridCell { x: 2, y: 6 });
        assert_eq!(cell.bar(0), Some(0));
        assert_eq!(cell.bar(7), Some(7));
    }

    #[test]
    fn test_to_grid_magnified() {
        let s = Settings {
            magnify: 2,
            ..Settings::default()
        };
        assert_eq!(to_grid(144.0, 98.0, &s, 0), Some(GridCell { x: 2, y: 1 }));
        assert_eq!(to_grid(48.0, 98.0, &s, 0), None);
    }

    #[test]
    fn test_first_window_has_clef_and_seven_bars() {
        let mut score = Score::blank(&Settings::default());
        score.looping = true;
        let p = project(&score, 0, 0.0, &edit_overlay());
        assert_eq!(p.clef_x, Some(9.0));
        assert_eq!(p.repeat_head_x, Some(41.0));
        assert_eq!(p.columns.len(), 7);
        assert_eq!(p.columns[0].bar, 0);
        assert_eq!(p.columns[0].x, 80.0);

        let p = project(&score, 1, 4.0, &edit_overlay());
        assert_eq!(p.clef_x, None);
        assert_eq!(p.repeat_head_x, Some(5.0));
        assert_eq!(p.columns.len(), 8);
        assert_eq!(p.columns[0].x, 44.0);

        let p = project(&score, 5, 0.0, &edit_overlay());
        assert_eq!(p.columns.len(), 9);
        assert_eq!(p.columns[0].bar, 3);
    }

    #[test]
    fn test_end_marker_and_notes() {
        let mut score = Score::blank(&Settings::default());
        score.end = 3;
        score.put_bar(1, Bar::from_notes(&[Note::new(2, 4), Note::new(0, 12)]));
        let p = project(&score, 0, 0.0, &edit_overlay());
        let col = &p.columns[1];
        assert_eq!(col.bar, 1);
        assert_eq!(col.notes.len(), 2);
        assert_eq!(col.notes[0].y, 72.0);
        assert!(col.ledger);
        assert_eq!(p.columns[3].marker, Some(EndMarker::End));
        score.looping = true;
        let p = project(&score, 0, 0.0, &edit_overlay());
        assert_eq!(p.columns[3].marker, Some(EndMarker::Repeat));
    }

    #[test]
    fn test_eraser_blink_hides_hovered_note() {
        let mut score = Score::blank(&Settings::default());
        score.put_bar(0, Bar::from_notes(&[Note::new(0, 4), Note::new(1, 5)]));
        let overlay = Overlay {
            hover: Some(GridCell { x: 2, y: 4 }),
            eraser_blink: true,
            ..Overlay::default()
        };
        let p = project(&score, 0, 0.0, &overlay);
        assert_eq!(p.columns[0].notes.len(), 1);
        assert_eq!(p.columns[0].notes[0].note, Note::new(1, 5));
        assert_eq!(p.hover, Some(GridCell { x: 2, y: 4 }));
    }

    #[test]
    fn test_no_measure_numbers_or_hover_while_playing() {
        let score = Score::blank(&Settings::default());
        let overlay = Overlay {
            status: GameStatus::Playing,
            hover: Some(GridCell { x: 3, y: 11 }),
            ..Overlay::default()
        };
        let p = project(&score, 0, 0.0, &overlay);
        assert!(p.columns.iter().all(|c| c.measure.is_none()));
        assert_eq!(p.hover, None);
        assert!(!p.hover_ledger);
    }

    #[test]
    fn test_sounded_bar_bounces() {
        let mut score = Score::blank(&Settings::default());
        score.put_bar(0, Bar::from_notes(&[Note::new(0, 4)]));
        let mut runner = TimingEngine::new();
        runner.pos = 2;
        runner.x = 80.0;
        let overlay = Overlay {
            status: GameStatus::Playing,
            runner: Some(&runner),
            ..Overlay::default()
        };
        let p = project(&score, 0, 0.0, &overlay);
        assert_eq!(p.columns[0].notes[0].y, 72.0 + crate::engine::BOUNCE_TABLE[8]);
    }
}
