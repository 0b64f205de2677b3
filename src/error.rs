//! Error types for score import and loading.
//!
//! Only user-reportable failures live here: malformed score text, bad JSON,
//! and sources that could not be read. Timing and sound guard conditions
//! (zero tempo, missing samples) are absorbed where they occur and never
//! surface as errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComposerError {
    /// An MSQ line is out of the fixed keyword order.
    #[error("Line {line} must start with '{expected}'")]
    Format { line: usize, expected: &'static str },

    /// A required key never appeared.
    #[error("Missing {0} value")]
    MissingField(&'static str),

    /// A key appeared with a value that does not parse.
    #[error("Invalid {key} value: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    /// A non-zero scale digit was the last digit of the score or its bar.
    #[error("Truncated note at offset {offset}: scale digit without tone digit")]
    TruncatedNote { offset: usize },

    #[error("Invalid score digit {found:?} at offset {offset}")]
    InvalidDigit { offset: usize, found: char },

    #[error("Invalid JSON score: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Downloading file {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ComposerError>;
