//! Drawing surface seam and a text-mode renderer.

use crate::engine::RunnerSprite;
use crate::sound::instrument_name;
use crate::types::*;
use crate::viewport::{column_x, EndMarker, Projection};
use log::warn;
use std::io::Write;

/// Everything needed to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameView {
    pub status: GameStatus,
    pub tool: Tool,
    pub projection: Projection,
    /// The character, whenever it is on stage.
    pub runner: Option<RunnerSprite>,
    pub bomb_frame: usize,
    /// End-mark cursor blink phase while that tool is selected.
    pub end_mark_frame: usize,
}

pub trait Renderer {
    fn draw(&mut self, view: &FrameView);
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn draw(&mut self, view: &FrameView) {
        (**self).draw(view)
    }
}

/// Draws nothing.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn draw(&mut self, _view: &FrameView) {}
}

// ─── Console ────────────────────────────────────────────────────────────────

/// Logical pixels per text cell.
const CELL_PX: f64 = 8.0;
/// Text cells across the 256-pixel screen.
const TEXT_COLS: usize = 32;
/// Pitch rows drawn.
const TEXT_ROWS: usize = 14;

/// Renders an ASCII view of the score window to a writer, one frame in
/// every `every_nth`.
pub struct ConsoleRenderer<W: Write> {
    out: W,
    every_nth: u64,
    count: u64,
    clear_screen: bool,
    write_failed: bool,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            every_nth: 1,
            count: 0,
            clear_screen: false,
            write_failed: false,
        }
    }

    pub fn with_every_nth(mut self, n: u64) -> Self {
        self.every_nth = n.max(1);
        self
    }

    /// Emit an ANSI clear-and-home before each frame.
    pub fn with_clear_screen(mut self, clear: bool) -> Self {
        self.clear_screen = clear;
        self
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Whether any frame failed to write. Only the first failure is logged.
    pub fn write_failed(&self) -> bool {
        self.write_failed
    }

    fn write_frame(&mut self, view: &FrameView) -> std::io::Result<()> {
        if self.clear_screen {
            write!(self.out, "\x1b[2J\x1b[H")?;
        }
        let p = &view.projection;
        writeln!(
            self.out,
            "── {:?} ── bar {} ── tool {} ──",
            view.status,
            p.bar_pos,
            tool_label(view.tool)
        )?;
        writeln!(self.out, "{}", runner_line(view.runner.as_ref()))?;
        writeln!(self.out, "{}", measure_line(p))?;
        for row in grid_lines(p) {
            writeln!(self.out, "{}", row)?;
        }
        self.out.flush()
    }
}

impl<W: Write> Renderer for ConsoleRenderer<W> {
    fn draw(&mut self, view: &FrameView) {
        self.count += 1;
        if (self.count - 1) % self.every_nth != 0 {
            return;
        }
        if let Err(e) = self.write_frame(view) {
            if !self.write_failed {
                warn!("Console write failed: {}", e);
                self.write_failed = true;
            }
        }
    }
}

fn tool_label(tool: Tool) -> String {
    match tool {
        Tool::Instrument(i) => instrument_name(i).to_string(),
        Tool::EndMark => "end-mark".to_string(),
        Tool::Eraser => "eraser".to_string(),
    }
}

fn text_col(x: f64) -> Option<usize> {
    let c = (x / CELL_PX).floor();
    (c >= 0.0 && (c as usize) < TEXT_COLS).then_some(c as usize)
}

fn runner_line(runner: Option<&RunnerSprite>) -> String {
    let mut line = vec![' '; TEXT_COLS];
    if let Some(r) = runner {
        if let Some(c) = text_col(r.x + CELL_PX) {
            line[c] = if r.y < RUNNER_Y { '^' } else { '@' };
            if r.sweat && c > 0 {
                line[c - 1] = '~';
            }
        }
    }
    line.into_iter().collect()
}

fn measure_line(p: &Projection) -> String {
    let mut line = vec![' '; TEXT_COLS];
    for col in &p.columns {
        if let (Some(m), Some(c)) = (col.measure, text_col(col.x)) {
            for (k, ch) in m.to_string().chars().enumerate() {
                if c + k < TEXT_COLS {
                    line[c + k] = ch;
                }
            }
        }
    }
    line.into_iter().collect()
}

fn grid_lines(p: &Projection) -> Vec<String> {
    let mut grid = vec![vec![' '; TEXT_COLS]; TEXT_ROWS];

    for col in &p.columns {
        let Some(c) = text_col(col.x) else { continue };
        let line = if col.accent { '|' } else { ':' };
        for row in grid.iter_mut() {
            row[c] = line;
        }
        if col.ledger {
            grid[LEDGER_ROW as usize][c] = '=';
        }
        match col.marker {
            Some(EndMarker::End) => grid[6][c] = 'E',
            Some(EndMarker::Repeat) => grid[6][c] = 'R',
            None => {}
        }
        for sprite in &col.notes {
            let row = ((sprite.y - 40.0) / CELL_PX).round();
            if row < 0.0 || row as usize >= TEXT_ROWS {
                continue;
            }
            let row = row as usize;
            grid[row][c] = char::from_digit(sprite.note.instrument() as u32 % 16, 16).unwrap_or('?');
            if c > 0 && sprite.note.is_sharp() {
                grid[row][c - 1] = '#';
            } else if c > 0 && sprite.note.is_flat() {
                grid[row][c - 1] = 'b';
            }
        }
    }

    if let Some(c) = p.clef_x.and_then(text_col) {
        for row in &mut grid[4..8] {
            row[c] = 'G';
        }
    }
    if let Some(c) = p.repeat_head_x.and_then(text_col) {
        grid[6][c] = 'R';
    }
    if let Some(h) = p.hover {
        if let (Some(c), Some(row)) = (text_col(column_x(h.x, 0.0)), grid.get_mut(h.y as usize)) {
            row[c] = '+';
        }
    }

    grid.into_iter().map(|r| r.into_iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Bar, Score};
    use crate::settings::Settings;
    use crate::viewport::{project, GridCell, Overlay};

    fn view_of(score: &Score, overlay: &Overlay) -> FrameView {
        FrameView {
            status: overlay.status,
            tool: Tool::default(),
            projection: project(score, 0, 0.0, overlay),
            runner: None,
            bomb_frame: 0,
            end_mark_frame: 0,
        }
    }

    #[test]
    fn test_console_draws_notes_and_clef() {
        let mut score = Score::blank(&Settings::default());
        score.put_bar(0, Bar::from_notes(&[Note::new(10, 2).with_sharp()]));
        let mut r = ConsoleRenderer::new(Vec::new());
        r.draw(&view_of(&score, &Overlay::default()));
        let text = String::from_utf8(r.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("Edit"));
        assert!(lines[0].contains("mario"));
        // header, runner, measures, then rows
        let row2: Vec<char> = lines[3 + 2].chars().collect();
        assert_eq!(row2[10], 'a');
        assert_eq!(row2[9], '#');
        let row5: Vec<char> = lines[3 + 5].chars().collect();
        assert_eq!(row5[1], 'G');
        assert!(lines[2].starts_with("          1"));
    }

    #[test]
    fn test_console_skips_frames() {
        let score = Score::blank(&Settings::default());
        let view = view_of(&score, &Overlay::default());
        let mut r = ConsoleRenderer::new(Vec::new()).with_every_nth(3);
        for _ in 0..7 {
            r.draw(&view);
        }
        let text = String::from_utf8(r.into_inner()).unwrap();
        assert_eq!(text.matches("── Edit").count(), 3);
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_console_write_error_is_recorded_not_fatal() {
        let score = Score::blank(&Settings::default());
        let view = view_of(&score, &Overlay::default());
        let mut r = ConsoleRenderer::new(ClosedPipe);
        assert!(!r.write_failed());
        r.draw(&view);
        r.draw(&view);
        assert!(r.write_failed());

        let mut ok = ConsoleRenderer::new(Vec::new());
        ok.draw(&view);
        assert!(!ok.write_failed());
    }

    #[test]
    fn test_console_hover_marker() {
        let score = Score::blank(&Settings::default());
        let overlay = Overlay {
            hover: Some(GridCell { x: 3, y: 7 }),
            ..Overlay::default()
        };
        let mut r = ConsoleRenderer::new(Vec::new());
        r.draw(&view_of(&score, &overlay));
        let text = String::from_utf8(r.into_inner()).unwrap();
        let row7: Vec<char> = text.lines().nth(3 + 7).unwrap().chars().collect();
        assert_eq!(row7[14], '+');
    }
}
