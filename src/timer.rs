//! Frame-driven decorative timers.
//!
//! A timer does nothing on its own: the frame loop hands it the current
//! timestamp and it advances its animation frame when its period has passed.

#[derive(Debug, Clone)]
pub struct FrameTimer {
    frequency_ms: f64,
    last_ms: f64,
    frames: usize,
    /// Fires only while on.
    pub switch: bool,
    pub current_frame: usize,
}

impl FrameTimer {
    /// A two-frame timer, initially off.
    pub fn new(frequency_ms: f64) -> Self {
        Self::with_frames(frequency_ms, 2)
    }

    pub fn with_frames(frequency_ms: f64, frames: usize) -> Self {
        Self {
            frequency_ms,
            last_ms: 0.0,
            frames: frames.max(1),
            switch: false,
            current_frame: 0,
        }
    }

    pub fn always_on(mut self) -> Self {
        self.switch = true;
        self
    }

    pub fn frequency_ms(&self) -> f64 {
        self.frequency_ms
    }

    /// Advance to the next frame if on and more than one period has
    /// elapsed since the last firing. Returns whether it fired.
    pub fn check_and_fire(&mut self, now_ms: f64) -> bool {
        if self.switch && now_ms - self.last_ms > self.frequency_ms {
            self.current_frame = (self.current_frame + 1) % self.frames;
            self.last_ms = now_ms;
            true
        } else {
            false
        }
    }

    pub fn set_switch(&mut self, on: bool) {
        self.switch = on;
        if !on {
            self.current_frame = 0;
        }
    }
}
