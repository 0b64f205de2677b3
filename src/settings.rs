//! Runtime settings: display magnification, score defaults and host frame rate.
//!
//! Serialized as JSON. Missing keys take their defaults so a settings file
//! only needs to name what it changes.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Integer display scale applied to every logical pixel coordinate.
    pub magnify: u32,
    /// Bars in a freshly initialised score.
    pub default_max_bars: usize,
    pub default_tempo: f64,
    /// Frame rate of the headless host loop.
    pub fps: u32,
    /// Undo snapshots retained.
    pub max_history: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            magnify: 1,
            default_max_bars: 24 * 4 + 1,
            default_tempo: 100.0,
            fps: 60,
            max_history: 10,
        }
    }
}

impl Settings {
    /// Load from a JSON file. Returns None if file is absent or malformed.
    pub fn load(path: &std::path::Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(s) => {
                info!("Loaded settings from {:?}", path);
                Some(s)
            }
            Err(e) => {
                warn!("Failed to parse settings file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn save(&self, path: &std::path::Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Width of one character cell in screen pixels.
    pub fn charsize(&self) -> f64 {
        16.0 * self.magnify.max(1) as f64
    }

    pub fn half_charsize(&self) -> f64 {
        (self.charsize() / 2.0).floor()
    }

    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.fps.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.default_max_bars, 97);
        assert_eq!(s.charsize(), 16.0);
        assert_eq!(s.half_charsize(), 8.0);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let s: Settings = serde_json::from_str(r#"{"magnify": 3}"#).unwrap();
        assert_eq!(s.magnify, 3);
        assert_eq!(s.charsize(), 48.0);
        assert_eq!(s.max_history, 10);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("paint_composer_settings_{}.json", std::process::id()));
        let s = Settings {
            fps: 30,
            ..Settings::default()
        };
        s.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, s);
    }

    #[test]
    fn test_malformed_file_returns_none() {
        let path = std::env::temp_dir().join(format!("paint_composer_bad_{}.json", std::process::id()));
        std::fs::write(&path, "not json").unwrap();
        assert!(Settings::load(&path).is_none());
        std::fs::remove_file(&path).ok();
    }
}
