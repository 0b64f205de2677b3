//! The composer session: one owner for the score, the edit history, the
//! playback state machine and the frame callback chain.
//!
//! Every per-frame step runs from [`Session::animate`], which dispatches
//! whatever the previous frame queued. Commands from outside (play, stop,
//! editing) only change state and queue the next step, so engine state is
//! only ever touched by the single live chain.

use crate::engine::TimingEngine;
use crate::error::{ComposerError, Result};
use crate::import::{import_files, import_text, FileFormat};
use crate::query::{LoadRequest, QueryOptions};
use crate::render::{FrameView, Renderer};
use crate::scheduler::{FrameCallback, FrameHandle, FrameScheduler};
use crate::score::Score;
use crate::settings::Settings;
use crate::sound::*;
use crate::timer::FrameTimer;
use crate::types::*;
use crate::viewport::{project, to_grid, GridCell, Overlay};
use crate::{json_format, msq};
use log::{debug, info, warn};
use std::collections::VecDeque;

const BOMB_PERIOD_MS: f64 = 150.0;
const ERASER_PERIOD_MS: f64 = 200.0;
const END_MARK_PERIOD_MS: f64 = 150.0;
const BOMB_FRAMES: usize = 4;

/// Session state as snapshotted into history.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub score: Score,
    /// Leftmost reference bar of the visible window.
    pub bar_pos: usize,
    pub current_tool: Tool,
    pub game_status: GameStatus,
}

/// A control that must not be used while the score plays.
pub trait ToggleControl {
    fn activate(&mut self);
    fn deactivate(&mut self);
}

pub struct Session<S: SoundBank, R: Renderer> {
    settings: Settings,
    state: AppState,
    history: VecDeque<AppState>,
    sound: S,
    renderer: R,
    scheduler: FrameScheduler,
    pending: Option<FrameHandle>,
    engine: Option<TimingEngine>,
    bomb_timer: FrameTimer,
    eraser_timer: FrameTimer,
    end_mark_timer: FrameTimer,
    controls: Vec<Box<dyn ToggleControl>>,
    /// Scroll limit while editing; follows the loaded score's length.
    cur_max_bars: usize,
    hover: Option<GridCell>,
    resizing: bool,
}

impl<S: SoundBank, R: Renderer> Session<S, R> {
    /// A blank score in Edit mode, with the idle frame already queued.
    pub fn new(settings: Settings, sound: S, renderer: R) -> Self {
        let score = Score::blank(&settings);
        let cur_max_bars = settings.default_max_bars;
        let mut session = Self {
            history: VecDeque::with_capacity(settings.max_history),
            state: AppState {
                score,
                bar_pos: 0,
                current_tool: Tool::default(),
                game_status: GameStatus::Edit,
            },
            settings,
            sound,
            renderer,
            scheduler: FrameScheduler::new(),
            pending: None,
            engine: None,
            bomb_timer: FrameTimer::with_frames(BOMB_PERIOD_MS, BOMB_FRAMES).always_on(),
            eraser_timer: FrameTimer::new(ERASER_PERIOD_MS),
            end_mark_timer: FrameTimer::new(END_MARK_PERIOD_MS),
            controls: Vec::new(),
            cur_max_bars,
            hover: None,
            resizing: false,
        };
        session.queue(FrameCallback::Idle);
        session
    }

    pub fn with_control(mut self, control: impl ToggleControl + 'static) -> Self {
        self.controls.push(Box::new(control));
        self
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn score(&self) -> &Score {
        &self.state.score
    }

    pub fn bar_pos(&self) -> usize {
        self.state.bar_pos
    }

    pub fn game_status(&self) -> GameStatus {
        self.state.game_status
    }

    pub fn current_tool(&self) -> Tool {
        self.state.current_tool
    }

    /// Snapshots, oldest first.
    pub fn history(&self) -> &VecDeque<AppState> {
        &self.history
    }

    pub fn engine(&self) -> Option<&TimingEngine> {
        self.engine.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cur_max_bars(&self) -> usize {
        self.cur_max_bars
    }

    pub fn hover(&self) -> Option<GridCell> {
        self.hover
    }

    pub fn sound(&self) -> &S {
        &self.sound
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn is_resizing(&self) -> bool {
        self.resizing
    }

    // ─── History ────────────────────────────────────────────────────────────

    /// Snapshot the current state, dropping the oldest beyond the limit.
    pub fn update_history(&mut self) {
        self.history.push_back(self.state.clone());
        while self.history.len() > self.settings.max_history {
            self.history.pop_front();
        }
    }

    /// Apply a mutation after snapshotting the current state.
    pub fn set_state(&mut self, mutate: impl FnOnce(&mut AppState)) {
        self.update_history();
        mutate(&mut self.state);
    }

    /// Apply a score change. Undoable in Edit; during playback it lands
    /// directly so history only ever holds Edit-mode states.
    fn edit_score(&mut self, mutate: impl FnOnce(&mut Score)) {
        if self.state.game_status == GameStatus::Edit {
            self.update_history();
        }
        mutate(&mut self.state.score);
    }

    /// Restore the score and tool of the most recent snapshot. Edit mode
    /// only; the playback status stays as it is.
    pub fn undo(&mut self) -> bool {
        if self.state.game_status != GameStatus::Edit {
            return false;
        }
        let Some(prev) = self.history.pop_back() else {
            return false;
        };
        self.state.score = prev.score;
        self.state.current_tool = prev.current_tool;
        self.cur_max_bars = self.state.score.notes.len().max(self.state.score.end + 1);
        self.state.bar_pos = prev.bar_pos.min(self.max_scroll());
        self.sync_tool_timers();
        self.sound.play(SFX_UNDO, PREVIEW_PITCH, 0.0);
        debug!("Undo, {} snapshots left", self.history.len());
        true
    }

    // ─── Editing ────────────────────────────────────────────────────────────

    /// Primary or secondary click at screen pixel (`real_x`, `real_y`).
    /// Returns whether the score changed.
    pub fn click(&mut self, real_x: f64, real_y: f64, button: PointerButton, modifiers: Modifiers) -> bool {
        if self.state.game_status != GameStatus::Edit {
            return false;
        }
        let Some(cell) = to_grid(real_x, real_y, &self.settings, self.state.bar_pos) else {
            return false;
        };
        let Some(b) = cell.bar(self.state.bar_pos) else {
            return false;
        };

        if button == PointerButton::Primary && self.state.current_tool == Tool::EndMark {
            self.set_state(|s| {
                s.score.end = b;
                s.score.pad_to_end();
            });
            debug!("End mark moved to bar {}", b);
            return true;
        }
        if b >= self.state.score.end {
            return false;
        }
        let mut bar = self.state.score.bar(b).cloned().unwrap_or_default();

        if button == PointerButton::Secondary || self.state.current_tool == Tool::Eraser {
            if bar.remove_top_in_row(cell.y).is_none() {
                return false;
            }
            self.set_state(|s| s.score.put_bar(b, bar));
            self.sound.play(SFX_ERASE, PREVIEW_PITCH, 0.0);
            return true;
        }

        let Tool::Instrument(instrument) = self.state.current_tool else {
            return false;
        };
        let mut note = Note::new(instrument, cell.y);
        if modifiers.shift {
            note = note.with_sharp();
        } else if modifiers.ctrl {
            note = note.with_flat();
        }
        if bar.contains(note) || bar.is_full() {
            return false;
        }

        self.sound.play(instrument, note.pitch(), 0.0);
        bar.push_note(note);
        self.set_state(|s| s.score.put_bar(b, bar));
        true
    }

    /// Track the hovered cell for the edit cursor.
    pub fn pointer_moved(&mut self, real_x: f64, real_y: f64) {
        self.hover = if self.state.game_status == GameStatus::Edit {
            to_grid(real_x, real_y, &self.settings, self.state.bar_pos)
        } else {
            None
        };
    }

    pub fn pointer_left(&mut self) {
        self.hover = None;
    }

    /// Select a tool and preview its sound.
    pub fn select_tool(&mut self, tool: Tool) {
        self.state.current_tool = tool;
        self.sync_tool_timers();
        let sample = match tool {
            Tool::Instrument(i) => i,
            Tool::EndMark => SFX_END_MARK,
            Tool::Eraser => SFX_ERASE,
        };
        self.sound.play(sample, PREVIEW_PITCH, 0.0);
    }

    fn sync_tool_timers(&mut self) {
        self.eraser_timer.set_switch(self.state.current_tool == Tool::Eraser);
        self.end_mark_timer.set_switch(self.state.current_tool == Tool::EndMark);
    }

    fn max_scroll(&self) -> usize {
        self.cur_max_bars.saturating_sub(TAIL_BARS)
    }

    pub fn scroll_to(&mut self, bar_pos: usize) -> bool {
        if self.state.game_status != GameStatus::Edit {
            return false;
        }
        self.state.bar_pos = bar_pos.min(self.max_scroll());
        true
    }

    pub fn scroll_left(&mut self) -> bool {
        let pos = self.state.bar_pos.saturating_sub(1);
        self.scroll_to(pos)
    }

    pub fn scroll_right(&mut self) -> bool {
        let pos = self.state.bar_pos + 1;
        self.scroll_to(pos)
    }

    /// Set the score tempo, clamped to the slider range. Takes effect on a
    /// running playback too.
    pub fn set_tempo(&mut self, tempo: f64) {
        let tempo = tempo.clamp(TEMPO_MIN, TEMPO_MAX);
        self.edit_score(|score| score.tempo = tempo);
        if let Some(engine) = self.engine.as_mut() {
            engine.set_tempo(tempo);
        }
    }

    pub fn set_beats(&mut self, beats: Beats) {
        self.edit_score(|score| score.beats = beats);
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.edit_score(|score| score.looping = !score.looping);
        self.state.score.looping
    }

    /// Start over with a blank score.
    pub fn clear(&mut self) -> bool {
        if self.state.game_status != GameStatus::Edit {
            return false;
        }
        let settings = self.settings.clone();
        self.set_state(|s| {
            s.score.init(&settings);
            s.bar_pos = 0;
        });
        self.cur_max_bars = self.settings.default_max_bars;
        self.sound.play(SFX_CLEAR, PREVIEW_PITCH, 0.0);
        info!("Score cleared");
        true
    }

    // ─── Loading and saving ─────────────────────────────────────────────────

    /// Replace the score with `text`. On failure the score holds whatever
    /// was imported before the error; undo brings the old one back.
    pub fn load_text(&mut self, text: &str, format: FileFormat) -> Result<()> {
        if self.state.game_status != GameStatus::Edit {
            warn!("Ignoring load while playing");
            return Ok(());
        }
        self.set_state(|s| s.score.reset());
        let result = import_text(&mut self.state.score, text, format);
        self.reinit_from_score();
        if result.is_ok() {
            info!(
                "Loaded {:?} score: {} bars, {} notes, tempo {}",
                format,
                self.state.score.end,
                self.state.score.note_count(),
                self.state.score.tempo
            );
        }
        result
    }

    /// Load a named song, picking the format from its name.
    pub fn load_song(&mut self, name: &str, text: &str) -> Result<()> {
        self.load_text(text, FileFormat::from_name(name))
    }

    /// Replace the score with several files joined end to end. Files that
    /// fail are returned; the others still load.
    pub fn load_files(&mut self, files: &mut [(String, String)]) -> Vec<(String, ComposerError)> {
        if self.state.game_status != GameStatus::Edit {
            warn!("Ignoring load while playing");
            return Vec::new();
        }
        self.set_state(|s| s.score.reset());
        let failures = import_files(&mut self.state.score, files);
        self.reinit_from_score();
        info!("Loaded {} files ({} failed)", files.len(), failures.len());
        failures
    }

    /// Load whatever the query names, reading `url` sources through
    /// `fetch`. Starts playback when auto-play is requested; returns whether
    /// it did.
    pub fn load_from_query<F>(&mut self, options: &QueryOptions, fetch: F) -> Result<bool>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        let Some(request) = options.load_request()? else {
            return Ok(false);
        };
        match request {
            LoadRequest::Url { url, format } => {
                let text = fetch(&url)?;
                self.load_text(&text, format)?;
            }
            LoadRequest::Inline { msq_text } => self.load_text(&msq_text, FileFormat::Msq)?,
        }
        Ok(options.auto_play() && self.play())
    }

    fn reinit_from_score(&mut self) {
        self.cur_max_bars = self.state.score.end + 1;
        self.state.bar_pos = 0;
        self.state.score.sync_tempo_from_first_bar();
    }

    pub fn export_json(&self, pretty: bool) -> Result<String> {
        json_format::export(&self.state.score, pretty)
    }

    pub fn share_query(&self) -> String {
        msq::share_query(&self.state.score)
    }

    // ─── Playback commands ──────────────────────────────────────────────────

    fn queue(&mut self, callback: FrameCallback) {
        self.pending = Some(self.scheduler.request(callback));
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.scheduler.cancel(handle);
        }
    }

    /// Edit → Entering.
    pub fn play(&mut self) -> bool {
        if self.state.game_status != GameStatus::Edit {
            return false;
        }
        for control in &mut self.controls {
            control.deactivate();
        }
        self.hover = None;
        self.begin_entering();
        info!("▶ Play ({} bars, tempo {})", self.state.score.end, self.state.score.tempo);
        true
    }

    fn begin_entering(&mut self) {
        self.state.game_status = GameStatus::Entering;
        self.state.bar_pos = 0;
        self.engine = Some(TimingEngine::new());
        self.cancel_pending();
        self.queue(FrameCallback::Enter);
    }

    /// Entering/Playing → Leaving.
    pub fn stop(&mut self) -> bool {
        if !matches!(self.state.game_status, GameStatus::Entering | GameStatus::Playing) {
            return false;
        }
        self.cancel_pending();
        self.begin_leaving();
        info!("■ Stop at bar {}", self.state.bar_pos);
        true
    }

    fn begin_leaving(&mut self) {
        self.state.game_status = GameStatus::Leaving;
        if let Some(engine) = self.engine.as_mut() {
            engine.init_for_leaving();
        }
        self.queue(FrameCallback::Leave);
    }

    /// Play again from the top. Starts playback when editing.
    pub fn restart(&mut self) -> bool {
        if self.state.game_status == GameStatus::Edit {
            return self.play();
        }
        self.begin_entering();
        info!("⟲ Restart");
        true
    }

    pub fn begin_resize(&mut self) {
        self.resizing = true;
    }

    pub fn finish_resize(&mut self, magnify: u32) {
        self.settings.magnify = magnify.max(1);
        self.resizing = false;
        debug!("Magnify now {}", self.settings.magnify);
    }

    // ─── Frame steps ────────────────────────────────────────────────────────

    /// Run every callback queued for this frame.
    pub fn animate(&mut self, now_ms: f64) {
        for callback in self.scheduler.take_due() {
            self.pending = None;
            match callback {
                FrameCallback::Idle => self.do_idle(now_ms),
                FrameCallback::Enter => self.do_enter(now_ms),
                FrameCallback::Play => self.do_play(now_ms),
                FrameCallback::Leave => self.do_leave(now_ms),
            }
        }
    }

    fn do_idle(&mut self, now_ms: f64) {
        if !self.resizing {
            self.bomb_timer.check_and_fire(now_ms);
            self.eraser_timer.check_and_fire(now_ms);
            self.end_mark_timer.check_and_fire(now_ms);
            self.draw(0.0);
        }
        if self.state.game_status == GameStatus::Edit {
            self.queue(FrameCallback::Idle);
        }
    }

    fn do_enter(&mut self, now_ms: f64) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if engine.enter(now_ms) {
            engine.init_for_playing(now_ms, &self.state.score);
            self.state.game_status = GameStatus::Playing;
            self.queue(FrameCallback::Play);
            debug!("Entered, playing");
        } else {
            self.queue(FrameCallback::Enter);
        }
        self.draw(0.0);
    }

    fn do_play(&mut self, now_ms: f64) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let score = &self.state.score;
        let outcome = engine.play(now_ms, score, &mut self.state.bar_pos);
        if let Some(bar) = outcome.crossed_bar.and_then(|i| score.bar(i)) {
            if let Some(tempo) = schedule_and_play(&mut self.sound, bar, 0.0) {
                engine.set_tempo(tempo);
            }
        }
        let scroll = engine.scroll;
        self.draw(scroll);

        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let score = &self.state.score;
        if !engine.reached_end(score) {
            self.queue(FrameCallback::Play);
        } else if score.looping {
            engine.restart_loop(now_ms, score, &mut self.state.bar_pos);
            debug!("Loop back to bar 0");
            self.queue(FrameCallback::Play);
        } else {
            info!("End of score reached");
            self.begin_leaving();
        }
    }

    fn do_leave(&mut self, now_ms: f64) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let done = engine.leave(now_ms, &mut self.state.bar_pos);
        let scroll = engine.scroll;
        self.draw(scroll);
        if done {
            self.state.game_status = GameStatus::Edit;
            self.engine = None;
            for control in &mut self.controls {
                control.activate();
            }
            self.queue(FrameCallback::Idle);
            info!("Back to edit mode");
        } else {
            self.queue(FrameCallback::Leave);
        }
    }

    /// The view as it would be drawn now.
    pub fn frame_view(&self, scroll: f64) -> FrameView {
        let status = self.state.game_status;
        let overlay = Overlay {
            status,
            hover: self.hover,
            eraser_blink: self.state.current_tool == Tool::Eraser && self.eraser_timer.current_frame == 1,
            runner: self.engine.as_ref(),
        };
        FrameView {
            status,
            tool: self.state.current_tool,
            projection: project(&self.state.score, self.state.bar_pos, scroll, &overlay),
            runner: self.engine.as_ref().map(TimingEngine::sprite),
            bomb_frame: self.bomb_timer.current_frame,
            end_mark_frame: self.end_mark_timer.current_frame,
        }
    }

    fn draw(&mut self, scroll: f64) {
        let view = self.frame_view(scroll);
        self.renderer.draw(&view);
    }
}
