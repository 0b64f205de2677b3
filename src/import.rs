//! Format selection and multi-file import.

use crate::error::{ComposerError, Result};
use crate::score::Score;
use crate::{json_format, msq};
use log::error;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Msq,
    Json,
}

impl FileFormat {
    /// Names ending in `msq` are MSQ text; everything else is JSON.
    pub fn from_name(name: &str) -> Self {
        if name.ends_with("msq") {
            FileFormat::Msq
        } else {
            FileFormat::Json
        }
    }
}

/// Append `text` in the given format to `score`.
pub fn import_text(score: &mut Score, text: &str, format: FileFormat) -> Result<()> {
    match format {
        FileFormat::Msq => msq::import(score, text),
        FileFormat::Json => json_format::import(score, text),
    }
}

/// First decimal number in a file name (`suite15.5.msq` -> 15.5), or 0.
pub fn embedded_number(name: &str) -> f64 {
    let bytes = name.as_bytes();
    let Some(start) = bytes.iter().position(u8::is_ascii_digit) else {
        return 0.0;
    };
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    name[start..end].parse().unwrap_or(0.0)
}

/// Import several named files in embedded-number order, each appended to
/// `score`. A file that fails is reported and skipped; the rest still load.
pub fn import_files(score: &mut Score, files: &mut [(String, String)]) -> Vec<(String, ComposerError)> {
    files.sort_by(|a, b| {
        embedded_number(&a.0)
            .partial_cmp(&embedded_number(&b.0))
            .unwrap_or(Ordering::Equal)
    });
    let mut failures = Vec::new();
    for (name, text) in files.iter() {
        if let Err(e) = import_text(score, text, FileFormat::from_name(name)) {
            error!("Loading {} failed: {}", name, e);
            failures.push((name.clone(), e));
        }
    }
    failures
}
