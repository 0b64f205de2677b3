//! Query-string load options.
//!
//! Either `url=<path>` names a score file, or the score travels inline as
//! `S`/`SCORE`, `T`/`TEMPO`, `L`/`LOOP`, `E`/`END`, `B`/`TIME44`. `a`/`auto`
//! asks for playback once loading succeeds.

use crate::error::{ComposerError, Result};
use crate::import::FileFormat;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadRequest {
    Url { url: String, format: FileFormat },
    /// Inline parameters assembled into MSQ text.
    Inline { msq_text: String },
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    params: HashMap<String, String>,
}

impl QueryOptions {
    /// Parse `a=b&c=d`, with or without a leading `?`. Values are
    /// percent-decoded; later duplicates win.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let params = query
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|p| {
                let (k, v) = p.split_once('=').unwrap_or((p, ""));
                (percent_decode(k), percent_decode(v))
            })
            .collect();
        Self { params }
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// First present value among `keys`.
    fn any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    /// True when `a`/`auto` is `T` or `TRUE` in any case.
    pub fn auto_play(&self) -> bool {
        self.any(&["a", "auto"]).map(is_true_flag).unwrap_or(false)
    }

    /// What to load, if anything. Inline scores need every key.
    pub fn load_request(&self) -> Result<Option<LoadRequest>> {
        if let Some(url) = self.get("url") {
            return Ok(Some(LoadRequest::Url {
                url: url.to_string(),
                format: FileFormat::from_name(url),
            }));
        }
        let Some(score) = self.any(&["SCORE", "S"]) else {
            return Ok(None);
        };
        let tempo = self.any(&["TEMPO", "T"]).ok_or(ComposerError::MissingField("TEMPO"))?;
        let looping = self.any(&["LOOP", "L"]).ok_or(ComposerError::MissingField("LOOP"))?;
        let end = self.any(&["END", "E"]).ok_or(ComposerError::MissingField("END"))?;
        let time44 = self.any(&["TIME44", "B"]).ok_or(ComposerError::MissingField("TIME44"))?;

        let msq_text = format!(
            "SCORE={}\nTEMPO={}\nLOOP={}\nEND={}\nTIME44={}",
            score,
            tempo,
            if is_true_flag(looping) { "TRUE" } else { "FALSE" },
            end,
            if is_true_flag(time44) { "TRUE" } else { "FALSE" },
        );
        Ok(Some(LoadRequest::Inline { msq_text }))
    }
}

fn is_true_flag(v: &str) -> bool {
    let v = v.trim().to_ascii_uppercase();
    v == "T" || v == "TRUE"
}

/// Decode `%XX` escapes and `+`. Malformed escapes pass through unchanged.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
