//! Pattern scanner over text values and raw byte windows

use super::patterns::{CompiledPattern, PatternRegistry};
use crate::domain::{ByteRange, Location, PhiCategory, PhiFinding, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Bytes read from the start of a file by the safety sweep
pub const SWEEP_WINDOW: u64 = 1_000_000;

/// Furthest a byte match is extended looking for its NUL terminator
pub const MAX_EXTENSION: usize = 256;

/// Sentinels written by earlier anonymization runs
const DATE_SENTINELS: [&str; 4] = ["1900:01:01", "0000:00:00", "1900/01/01", "1900-01-01"];

/// A pattern hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub label: String,
    pub category: PhiCategory,
    /// Start offset (byte offset in the text, or absolute file offset)
    pub start: u64,
    /// Exclusive end offset, including any extension to a NUL
    pub end: u64,
    /// Exclusive end of the regex match itself
    pub core_end: u64,
    pub text: String,
}

impl PatternMatch {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.start, self.len())
    }
}

/// True when a date value is empty or carries an anonymized sentinel
pub fn is_date_anonymized(value: &str) -> bool {
    DATE_SENTINELS.iter().any(|s| value.contains(s))
        || value.trim_matches(|c| c == '\0' || c == ' ').is_empty()
}

/// Vendor-agnostic scanner
#[derive(Debug, Clone)]
pub struct PatternScanner {
    registry: Arc<PatternRegistry>,
}

impl PatternScanner {
    /// Scanner with the built-in pattern library
    pub fn new() -> Result<Self> {
        Ok(Self::with_registry(PatternRegistry::default_patterns()?))
    }

    pub fn with_registry(registry: PatternRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Identifier rules over a text value; offsets are byte offsets in `text`
    pub fn scan_text(&self, text: &str) -> Vec<PatternMatch> {
        self.scan_text_filtered(text, |p| !p.date)
    }

    /// Date rules over a text value; anonymized sentinels are skipped
    pub fn scan_dates(&self, text: &str) -> Vec<PatternMatch> {
        self.scan_text_filtered(text, |p| p.date)
    }

    fn scan_text_filtered(
        &self,
        text: &str,
        keep: impl Fn(&CompiledPattern) -> bool,
    ) -> Vec<PatternMatch> {
        let mut matches = Vec::new();
        for pattern in self.registry.all_patterns().iter().filter(|p| keep(p)) {
            let mut at = 0;
            while at <= text.len() {
                let Some(m) = pattern.text.find_at(text, at) else {
                    break;
                };
                if pattern.guards_pass(text.as_bytes(), m.start(), m.end()) {
                    if !(pattern.date && is_date_anonymized(m.as_str())) {
                        matches.push(PatternMatch {
                            label: pattern.label.clone(),
                            category: pattern.category,
                            start: m.start() as u64,
                            end: m.end() as u64,
                            core_end: m.end() as u64,
                            text: m.as_str().to_string(),
                        });
                    }
                    at = m.end().max(m.start() + 1);
                } else {
                    // retry one character later, as a look-behind would
                    at = m.start()
                        + text[m.start()..]
                            .chars()
                            .next()
                            .map_or(1, char::len_utf8);
                }
            }
        }
        matches
    }

    /// Identifier rules over raw bytes starting at file offset `base`
    ///
    /// Matches extend to the next NUL (at most [`MAX_EXTENSION`] bytes past
    /// the match). Runs of 'X' are skipped.
    pub fn scan_bytes(&self, data: &[u8], base: u64) -> Vec<PatternMatch> {
        let mut matches = Vec::new();
        for pattern in self.registry.all_patterns().iter().filter(|p| p.sweep) {
            let mut at = 0;
            while at <= data.len() {
                let Some(m) = pattern.bytes.find_at(data, at) else {
                    break;
                };
                if !pattern.guards_pass(data, m.start(), m.end()) {
                    at = m.start() + 1;
                    continue;
                }
                at = m.end().max(m.start() + 1);

                let limit = data.len().min(m.end() + MAX_EXTENSION);
                let end = data[m.end()..limit]
                    .iter()
                    .position(|b| *b == 0)
                    .map_or(m.end(), |p| m.end() + p);
                let matched = &data[m.start()..end];
                if matched.iter().all(|b| *b == b'X') {
                    continue;
                }
                if pattern.date
                    && is_date_anonymized(&String::from_utf8_lossy(matched))
                {
                    continue;
                }
                matches.push(PatternMatch {
                    label: pattern.label.clone(),
                    category: pattern.category,
                    start: base + m.start() as u64,
                    end: base + end as u64,
                    core_end: base + m.end() as u64,
                    text: String::from_utf8_lossy(matched).into_owned(),
                });
            }
        }
        matches
    }

    /// Safety sweep over a window of raw bytes
    ///
    /// Skips matches whose regex match overlaps `excluded` (ranges already
    /// claimed by structured findings, and image data), stops extensions at
    /// the next excluded range and keeps one match per (offset, category).
    pub fn sweep(&self, data: &[u8], base: u64, excluded: &[ByteRange]) -> Vec<PatternMatch> {
        let mut seen = HashSet::new();
        self.scan_bytes(data, base)
            .into_iter()
            .filter(|m| {
                let core = ByteRange::new(m.start, m.core_end - m.start);
                !excluded.iter().any(|r| r.overlaps(&core))
            })
            .map(|mut m| {
                let clip = excluded
                    .iter()
                    .filter(|r| r.offset >= m.core_end && r.offset < m.end)
                    .map(|r| r.offset)
                    .min();
                if let Some(limit) = clip {
                    let from = (m.start - base) as usize;
                    let to = (limit - base) as usize;
                    m.text = String::from_utf8_lossy(&data[from..to]).into_owned();
                    m.end = limit;
                }
                m
            })
            .filter(|m| seen.insert((m.start, m.category)))
            .collect()
    }

    /// Scan a file name stem; hits can only be fixed by renaming the file
    pub fn scan_filename(&self, path: &Path) -> Vec<PhiFinding> {
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.scan_text(&stem)
            .into_iter()
            .filter(|m| seen.insert((m.start, m.category)))
            .map(|m| {
                PhiFinding::new(
                    m.category,
                    format!("filename:{}", m.label),
                    Location::Filename,
                    &m.text,
                )
            })
            .collect()
    }
}
