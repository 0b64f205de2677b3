//! Timing engine: the walking character that plays the score.
//!
//! Positions are logical pixels. One bar is 32 units wide, so at `tempo`
//! beats per minute the character covers `32 * tempo / 60000` units per
//! millisecond. Three motion regimes share that rate:
//!
//! 1. running in: the character walks from the left edge towards the centre;
//! 2. scrolling: the character is held at the centre and the score scrolls
//!    under it, one bar every 32 units;
//! 3. running out: within the last bars of the score scrolling stops and the
//!    character walks towards the right edge again.
//!
//! The engine never calls the sound bank. `play` reports which bar was
//! crossed and the session decides what to sound.

use crate::score::Score;
use crate::timer::FrameTimer;
use crate::types::*;
use log::{debug, trace};

/// Vertical jump offset by horizontal phase within a bar.
pub const JUMP_TABLE: [f64; 33] = [
    0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0, 18.0, 19.0, 19.0,
    19.0, 19.0, 19.0, 18.0, 18.0, 17.0, 16.0, 15.0, 14.0, 13.0, 12.0, 10.0, 8.0, 6.0, 4.0, 2.0,
    0.0,
];

/// Downward offset of a note sprite by the character's distance from it.
pub const BOUNCE_TABLE: [f64; 33] = [
    0.0, 1.0, 2.0, 3.0, 3.0, 4.0, 5.0, 5.0, 6.0, 6.0, 7.0, 7.0, 8.0, 8.0, 8.0, 8.0, 8.0, 8.0,
    8.0, 8.0, 8.0, 7.0, 7.0, 6.0, 6.0, 5.0, 5.0, 4.0, 3.0, 3.0, 2.0, 1.0, 0.0,
];

/// Frame-time clamp: a gap longer than this (hidden window, debugger) is
/// replaced by one nominal frame.
pub const MAX_FRAME_GAP_MS: f64 = 32.0;
pub const NOMINAL_FRAME_MS: f64 = 16.0;

const WALK_PERIOD_MS: f64 = 100.0;
/// Entering walk: one logical pixel every 5 ms.
const ENTER_MS_PER_PX: f64 = 5.0;
/// Leaving walk: one logical pixel every 4 ms.
const LEAVE_MS_PER_PX: f64 = 4.0;

// Sprite sheet frames.
pub const FRAME_WALK_A: u8 = 0;
pub const FRAME_WALK_B: u8 = 1;
pub const FRAME_JUMP: u8 = 2;
pub const FRAME_SWEAT: u8 = 8;
pub const FRAME_LEAVE: u8 = 9;

/// Units moved in one frame of `diff_ms` at `tempo`. The gap is clamped
/// first; a non-positive or non-finite tempo moves nothing.
pub fn step_size(diff_ms: f64, tempo: f64) -> f64 {
    if !(tempo.is_finite() && tempo > 0.0) {
        return 0.0;
    }
    let diff = if diff_ms > MAX_FRAME_GAP_MS {
        NOMINAL_FRAME_MS
    } else {
        diff_ms.max(0.0)
    };
    BAR_WIDTH * diff * tempo / 60000.0
}

fn jump_height(phase: f64) -> f64 {
    JUMP_TABLE[(phase.round() as i64).rem_euclid(32) as usize]
}

/// True while scrolling can still happen at `bar_pos`.
fn can_scroll(bar_pos: usize, end: usize) -> bool {
    (bar_pos as i64) <= end as i64 - TAIL_BARS as i64
}

/// What a playing frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepOutcome {
    /// Bar whose notes should sound now.
    pub crossed_bar: Option<usize>,
    /// The visible window advanced by one bar.
    pub scrolled: bool,
}

/// Where and how to draw the character this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerSprite {
    pub frame: u8,
    pub x: f64,
    pub y: f64,
    /// Draw the sweat drop just left of the character.
    pub sweat: bool,
}

#[derive(Debug, Clone)]
pub struct TimingEngine {
    /// Character x in the fixed viewport.
    pub x: f64,
    /// Sub-bar scroll, 0..32.
    pub scroll: f64,
    /// Bar the character is on, one ahead of the last bar sounded.
    pub pos: usize,
    pub is_jumping: bool,
    last_time_ms: f64,
    start_ms: Option<f64>,
    offset: f64,
    frame: u8,
    walk_timer: FrameTimer,
    tempo: f64,
}

impl TimingEngine {
    /// A character waiting off-screen on the left.
    pub fn new() -> Self {
        Self {
            x: ENTRY_X,
            scroll: 0.0,
            pos: 0,
            is_jumping: false,
            last_time_ms: 0.0,
            start_ms: None,
            offset: ENTRY_X,
            frame: FRAME_WALK_A,
            walk_timer: FrameTimer::new(WALK_PERIOD_MS).always_on(),
            tempo: 0.0,
        }
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: f64) {
        let tempo = clamp_tempo(tempo);
        if tempo != self.tempo {
            debug!("Playback tempo {} -> {}", self.tempo, tempo);
        }
        self.tempo = tempo;
    }

    // ─── Entering ───────────────────────────────────────────────────────────

    /// Walk in from the left. Returns true once the character stands at the
    /// start of the grid.
    pub fn enter(&mut self, now_ms: f64) -> bool {
        let start = *self.start_ms.get_or_insert(now_ms);
        let diff = now_ms - start;
        self.x = ((diff / ENTER_MS_PER_PX).floor() + self.offset).min(PLAY_START_X);
        self.frame = if (diff / 100.0).floor() as i64 % 2 == 0 {
            FRAME_WALK_B
        } else {
            FRAME_WALK_A
        };
        self.x >= PLAY_START_X
    }

    /// Reset timing for the playing phase. Bar 0 sounds when the character
    /// first crosses a bar line; only its tempo change takes effect now.
    pub fn init_for_playing(&mut self, now_ms: f64, score: &Score) {
        self.last_time_ms = now_ms;
        self.offset = self.x;
        self.scroll = 0.0;
        self.pos = 1;
        self.tempo = clamp_tempo(score.tempo);
        if let Some(t) = score.bar(0).and_then(|b| b.tempo_marker()) {
            self.set_tempo(t);
        }
        self.update_jump(score);
        debug!("Playing from x={} at tempo {}", self.x, self.tempo);
    }

    // ─── Playing ────────────────────────────────────────────────────────────

    /// Advance one frame. `bar_pos` is the leftmost visible bar reference and
    /// is advanced when the score scrolls by a whole bar.
    pub fn play(&mut self, now_ms: f64, score: &Score, bar_pos: &mut usize) -> StepOutcome {
        let diff = now_ms - self.last_time_ms;
        self.last_time_ms = now_ms;
        if self.walk_timer.check_and_fire(now_ms) {
            self.frame = self.walk_timer.current_frame as u8;
        }

        let step = step_size(diff, self.tempo);
        if step == 0.0 {
            if self.tempo <= 0.0 || !self.tempo.is_finite() {
                debug!("Tempo {} cannot advance playback, holding", self.tempo);
            }
            return StepOutcome::default();
        }

        let mut outcome = StepOutcome::default();
        let next_bar =
            HALF_BAR + BAR_WIDTH * (self.pos as i64 - *bar_pos as i64 + 1) as f64 - 8.0;

        if self.x < CENTER_X {
            self.x += step;
            if self.x >= next_bar {
                outcome.crossed_bar = Some(self.cross_bar(score));
            } else if self.x >= CENTER_X && can_scroll(*bar_pos, score.end) {
                self.scroll = self.x - CENTER_X;
                self.x = CENTER_X;
            }
        } else if can_scroll(*bar_pos, score.end) {
            self.x = CENTER_X;
            if self.scroll < HALF_BAR && self.scroll + step >= HALF_BAR {
                outcome.crossed_bar = Some(self.cross_bar(score));
            }
            self.scroll += step;
            if self.scroll > BAR_WIDTH {
                self.scroll -= BAR_WIDTH;
                *bar_pos += 1;
                outcome.scrolled = true;
                trace!("Scrolled to bar {}", bar_pos);
                if !can_scroll(*bar_pos, score.end) {
                    self.x += self.scroll;
                    self.scroll = 0.0;
                }
            }
        } else {
            self.x += step;
            if self.x >= next_bar {
                outcome.crossed_bar = Some(self.cross_bar(score));
            }
        }

        trace!("x={:.2} scroll={:.2} pos={} bar_pos={}", self.x, self.scroll, self.pos, bar_pos);
        outcome
    }

    fn cross_bar(&mut self, score: &Score) -> usize {
        self.pos += 1;
        self.update_jump(score);
        let bar = self.pos - 2;
        debug!("Bar {} reached (jump: {})", bar, self.is_jumping);
        bar
    }

    fn update_jump(&mut self, score: &Score) {
        self.is_jumping = self
            .pos
            .checked_sub(1)
            .and_then(|i| score.bar(i))
            .map(|b| b.has_notes())
            .unwrap_or(false);
    }

    /// The character has sounded the last playable bar.
    pub fn reached_end(&self, score: &Score) -> bool {
        self.pos as i64 - 2 == score.end as i64 - 1
    }

    /// Wrap to the start of the score and keep playing.
    pub fn restart_loop(&mut self, now_ms: f64, score: &Score, bar_pos: &mut usize) {
        *bar_pos = 0;
        self.pos = 1;
        self.x = PLAY_START_X;
        self.init_for_playing(now_ms, score);
    }

    // ─── Leaving ────────────────────────────────────────────────────────────

    pub fn init_for_leaving(&mut self) {
        self.offset = self.x;
        self.start_ms = None;
        self.is_jumping = false;
    }

    /// Walk off to the right, finishing a partial scroll first. Returns true
    /// once the character is past the right edge.
    pub fn leave(&mut self, now_ms: f64, bar_pos: &mut usize) -> bool {
        let start = *self.start_ms.get_or_insert(now_ms);
        let diff = now_ms - start;
        let walked = (diff / LEAVE_MS_PER_PX).floor();

        if self.scroll > 0.0 && self.scroll < BAR_WIDTH {
            self.scroll += walked;
            if self.scroll > BAR_WIDTH {
                self.x += self.scroll - BAR_WIDTH;
                self.scroll = 0.0;
                *bar_pos += 1;
                self.offset = self.x - walked;
            }
        } else {
            self.x = walked + self.offset;
        }

        self.frame = if (diff / 100.0).floor() as i64 % 2 == 0 {
            FRAME_SWEAT
        } else {
            FRAME_LEAVE
        };
        self.x >= EXIT_X
    }

    // ─── Drawing support ────────────────────────────────────────────────────

    pub fn sprite(&self) -> RunnerSprite {
        let mut y = RUNNER_Y;
        let mut frame = self.frame;
        if self.is_jumping {
            frame = FRAME_JUMP;
            if self.x == CENTER_X {
                // scroll 16 is exactly on the bar line: feet on the ground
                if self.scroll != HALF_BAR {
                    let phase = if self.scroll > HALF_BAR {
                        self.scroll - HALF_BAR
                    } else {
                        self.scroll + HALF_BAR
                    };
                    y -= jump_height(phase);
                }
            } else {
                y -= jump_height((self.x - 8.0).rem_euclid(BAR_WIDTH));
            }
        }
        RunnerSprite {
            frame,
            x: self.x,
            y,
            sweat: frame == FRAME_SWEAT,
        }
    }

    /// Downward bounce of the notes in `bar`, drawn with its column origin at
    /// `x_origin`. Only the bar just sounded bounces.
    pub fn note_bounce(&self, bar: usize, x_origin: f64) -> f64 {
        if self.pos as i64 - 2 != bar as i64 {
            return 0.0;
        }
        let idx = if self.x == CENTER_X {
            if self.scroll >= HALF_BAR {
                self.scroll - HALF_BAR
            } else {
                self.scroll + HALF_BAR
            }
        } else {
            self.x + 8.0 - x_origin
        };
        let idx = idx.round();
        if idx < 0.0 {
            return 0.0;
        }
        BOUNCE_TABLE.get(idx as usize).copied().unwrap_or(0.0)
    }
}

impl Default for TimingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::Bar;
    use crate::settings::Settings;

    fn score_with_notes(bars: &[usize], end: usize) -> Score {
        let mut score = Score::blank(&Settings::default());
        for &b in bars {
            score.put_bar(b, Bar::from_notes(&[Note::new(0, 5)]));
        }
        score.end = end;
        score.pad_to_end();
        score
    }

    /// Engine standing at the grid start, ready to play at `now`.
    fn playing_engine(score: &Score, now: f64) -> TimingEngine {
        let mut e = TimingEngine::new();
        e.x = PLAY_START_X;
        e.init_for_playing(now, score);
        e
    }

    #[test]
    fn test_step_proportional_to_diff() {
        let a = step_size(8.0, 100.0);
        let b = step_size(16.0, 100.0);
        assert!((b - 2.0 * a).abs() < 1e-12);
        assert!((b - 32.0 * 16.0 * 100.0 / 60000.0).abs() < 1e-12);
    }

    #[test]
    fn test_frame_gap_clamped() {
        let score = score_with_notes(&[], 96);
        let mut stalled = playing_engine(&score, 0.0);
        let mut normal = playing_engine(&score, 0.0);
        let mut bp1 = 0;
        let mut bp2 = 0;
        stalled.play(1000.0, &score, &mut bp1);
        normal.play(16.0, &score, &mut bp2);
        assert!((stalled.x - PLAY_START_X) > 0.0);
        assert!((stalled.x - normal.x).abs() < 1e-12);
    }

    #[test]
    fn test_zero_tempo_holds_but_time_flows() {
        let mut score = score_with_notes(&[], 96);
        score.tempo = 0.0;
        let mut e = playing_engine(&score, 0.0);
        let mut bp = 0;
        let out = e.play(16.0, &score, &mut bp);
        assert_eq!(out, StepOutcome::default());
        assert_eq!(e.x, PLAY_START_X);
        e.set_tempo(100.0);
        e.play(32.0, &score, &mut bp);
        assert!((e.x - PLAY_START_X - step_size(16.0, 100.0)).abs() < 1e-12);
    }

    #[test]
    fn test_single_bar_crossing() {
        let score = score_with_notes(&[0], 96);
        let mut e = playing_engine(&score, 0.0);
        assert_eq!(e.pos, 1);
        assert!(e.is_jumping);
        let mut bp = 0;
        let mut crossings = Vec::new();
        let mut now = 0.0;
        while e.x < 72.0 {
            now += 16.0;
            if let Some(b) = e.play(now, &score, &mut bp).crossed_bar {
                crossings.push(b);
            }
        }
        assert_eq!(crossings, vec![0]);
        assert_eq!(e.pos, 2);
        assert!(!e.is_jumping);
    }

    #[test]
    fn test_running_in_hands_over_to_scroll() {
        let score = score_with_notes(&[], 96);
        let mut e = playing_engine(&score, 0.0);
        let mut bp = 0;
        let mut now = 0.0;
        let mut crossings = 0;
        while e.x < CENTER_X {
            now += 16.0;
            if e.play(now, &score, &mut bp).crossed_bar.is_some() {
                crossings += 1;
            }
        }
        assert_eq!(e.x, CENTER_X);
        assert_eq!(crossings, 2);
        assert_eq!(e.pos, 3);
        assert!(e.scroll < 1.0);
    }

    #[test]
    fn test_scroll_crosses_half_bar_then_advances_window() {
        let score = score_with_notes(&[], 96);
        let mut e = playing_engine(&score, 0.0);
        e.x = CENTER_X;
        e.pos = 3;
        e.scroll = 15.5;
        let mut bp = 0;
        let out = e.play(16.0, &score, &mut bp);
        assert_eq!(out.crossed_bar, Some(2));
        assert!(!out.scrolled);
        e.scroll = 31.9;
        let out = e.play(32.0, &score, &mut bp);
        assert!(out.scrolled);
        assert_eq!(bp, 1);
        assert!(e.scroll < 1.0);
        assert_eq!(e.x, CENTER_X);
    }

    #[test]
    fn test_scroll_stops_near_end() {
        let score = score_with_notes(&[], 20);
        let mut e = playing_engine(&score, 0.0);
        e.x = CENTER_X;
        e.scroll = 31.9;
        e.pos = 18;
        let mut bp = 14;
        let out = e.play(16.0, &score, &mut bp);
        assert!(out.scrolled);
        assert_eq!(bp, 15);
        assert_eq!(e.scroll, 0.0);
        assert!(e.x > CENTER_X);
        let x = e.x;
        e.play(32.0, &score, &mut bp);
        assert!(e.x > x);
        assert_eq!(bp, 15);
    }

    #[test]
    fn test_short_score_never_scrolls() {
        let score = score_with_notes(&[], 4);
        let mut e = playing_engine(&score, 0.0);
        let mut bp = 0;
        let mut now = 0.0;
        while !e.reached_end(&score) && now < 60_000.0 {
            now += 16.0;
            e.play(now, &score, &mut bp);
        }
        assert!(e.reached_end(&score));
        assert_eq!(bp, 0);
        assert_eq!(e.scroll, 0.0);
        assert!(e.x > CENTER_X);
    }

    #[test]
    fn test_reached_end_and_loop_restart() {
        let score = score_with_notes(&[], 8);
        let mut e = playing_engine(&score, 0.0);
        e.pos = 9;
        assert!(e.reached_end(&score));
        let mut bp = 3;
        e.x = 180.0;
        e.restart_loop(500.0, &score, &mut bp);
        assert_eq!(bp, 0);
        assert_eq!(e.pos, 1);
        assert_eq!(e.x, PLAY_START_X);
        assert_eq!(e.scroll, 0.0);
    }

    #[test]
    fn test_first_bar_tempo_marker_applies_at_start() {
        let mut score = score_with_notes(&[], 96);
        score.notes[0].set_tempo_marker(200.0);
        let e = playing_engine(&score, 0.0);
        assert_eq!(e.tempo(), 200.0);
        assert!(!e.is_jumping);
    }

    #[test]
    fn test_out_of_range_tempos_clamped_for_playback() {
        let mut score = score_with_notes(&[], 96);
        score.tempo = 5000.0;
        let e = playing_engine(&score, 0.0);
        assert_eq!(e.tempo(), TEMPO_MAX);

        score.tempo = 100.0;
        score.notes[0].set_tempo_marker(2.0);
        let mut e = playing_engine(&score, 0.0);
        assert_eq!(e.tempo(), TEMPO_MIN);
        e.set_tempo(1e9);
        assert_eq!(e.tempo(), TEMPO_MAX);
    }

    #[test]
    fn test_enter_walks_to_grid_start() {
        let mut e = TimingEngine::new();
        assert!(!e.enter(1000.0));
        assert_eq!(e.x, ENTRY_X);
        assert!(!e.enter(1100.0));
        assert_eq!(e.x, ENTRY_X + 20.0);
        assert!(e.enter(1400.0));
        assert_eq!(e.x, PLAY_START_X);
    }

    #[test]
    fn test_leave_walks_off_with_sweat() {
        let mut e = TimingEngine::new();
        e.x = 200.0;
        e.init_for_leaving();
        let mut bp = 10;
        assert!(!e.leave(0.0, &mut bp));
        assert!(e.sprite().sweat);
        assert!(!e.leave(150.0, &mut bp));
        assert_eq!(e.sprite().frame, FRAME_LEAVE);
        assert!(e.leave(200.0, &mut bp));
        assert_eq!(bp, 10);
    }

    #[test]
    fn test_leave_finishes_partial_scroll() {
        let mut e = TimingEngine::new();
        e.x = CENTER_X;
        e.scroll = 20.0;
        e.init_for_leaving();
        let mut bp = 5;
        e.leave(0.0, &mut bp);
        e.leave(40.0, &mut bp);
        assert_eq!(e.scroll, 30.0);
        e.leave(80.0, &mut bp);
        assert_eq!(bp, 6);
        assert_eq!(e.scroll, 0.0);
        assert_eq!(e.x, CENTER_X + 18.0);
        e.leave(84.0, &mut bp);
        assert_eq!(e.x, CENTER_X + 19.0);
    }

    #[test]
    fn test_jump_sprite_offsets() {
        let mut e = TimingEngine::new();
        e.is_jumping = true;
        e.x = CENTER_X;
        e.scroll = HALF_BAR;
        assert_eq!(e.sprite().y, RUNNER_Y);
        assert_eq!(e.sprite().frame, FRAME_JUMP);
        e.scroll = 0.0;
        assert_eq!(e.sprite().y, RUNNER_Y - 19.0);
        e.x = 56.0;
        assert_eq!(e.sprite().y, RUNNER_Y - 19.0);
        e.x = 40.0;
        assert_eq!(e.sprite().y, RUNNER_Y);
    }

    #[test]
    fn test_note_bounce_only_for_sounded_bar() {
        let mut e = TimingEngine::new();
        e.pos = 4;
        e.x = CENTER_X;
        e.scroll = 4.0;
        assert_eq!(e.note_bounce(2, 0.0), BOUNCE_TABLE[20]);
        assert_eq!(e.note_bounce(3, 0.0), 0.0);
        e.x = 90.0;
        assert_eq!(e.note_bounce(2, 80.0), BOUNCE_TABLE[18]);
        assert_eq!(e.note_bounce(2, 120.0), 0.0);
    }
}
