//! Domain error types
//!
//! This module defines the error hierarchy for slidescrub.
//! Every per-file failure is mapped onto one of these variants so that a
//! batch report always says which file failed, at which stage, and why.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main slidescrub error type
#[derive(Debug, Error)]
pub enum ScrubError {
    /// Malformed, truncated or cyclic container
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// No handler claims the file
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A located field could not be overwritten without changing its footprint
    #[error("Redaction error: {0}")]
    Redaction(String),

    /// Diagnostic image fingerprint changed during mutation
    #[error("Integrity mismatch: {0}")]
    IntegrityMismatch(String),

    /// Required sidecar or companion directory is absent
    #[error("Companion missing: {0}")]
    CompanionMissing(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid detection pattern
    #[error("Pattern error: {0}")]
    Pattern(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl ScrubError {
    /// Short machine-readable name of the variant, used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            ScrubError::Parse(_) => "parse_error",
            ScrubError::UnsupportedFormat(_) => "unsupported_format",
            ScrubError::Redaction(_) => "redaction_error",
            ScrubError::IntegrityMismatch(_) => "integrity_mismatch",
            ScrubError::CompanionMissing(_) => "companion_missing",
            ScrubError::Configuration(_) => "configuration",
            ScrubError::Pattern(_) => "pattern",
            ScrubError::Io(_) => "io",
            ScrubError::Serialization(_) => "serialization",
            ScrubError::Other(_) => "other",
        }
    }
}

/// Reasons a container or document could not be parsed
///
/// Parsing never panics on crafted input; every malformed structure maps to
/// one of these reasons and the file is treated as not clean.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Header is too short or structurally invalid
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Byte order mark or version field not recognized
    #[error("unsupported magic number 0x{0:04x}")]
    UnsupportedMagic(u16),

    /// A read ran past the end of the file
    #[error("truncated read of {wanted} bytes at offset {offset}")]
    Truncated { offset: u64, wanted: u64 },

    /// Directory entry count is larger than any sane directory
    #[error("directory at offset {offset} declares {count} entries")]
    TooManyEntries { offset: u64, count: u64 },

    /// A directory chain points back to an already visited directory
    #[error("directory cycle detected at offset {0}")]
    Cycle(u64),

    /// Directory chain is longer than the traversal cap
    #[error("directory chain exceeds {0} directories")]
    ChainTooLong(usize),

    /// A field entry is internally inconsistent
    #[error("malformed field {tag}: {reason}")]
    MalformedField { tag: u16, reason: String },

    /// A tagged element in an element-tree document is invalid
    #[error("malformed element: {0}")]
    MalformedElement(String),

    /// A text document (configuration file) is invalid
    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

/// Processing stage at which a file failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detect,
    Scan,
    Copy,
    Anonymize,
    Integrity,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Detect => "detect",
            Stage::Scan => "scan",
            Stage::Copy => "copy",
            Stage::Anonymize => "anonymize",
            Stage::Integrity => "integrity",
            Stage::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Per-file failure details
///
/// Provides the file, stage and reason for a failure so that user-visible
/// output is never a generic "processing failed".
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    /// File that failed
    pub path: PathBuf,

    /// Stage at which processing stopped
    pub stage: Stage,

    /// Error kind (see [`ScrubError::kind`])
    pub kind: String,

    /// Error message
    pub reason: String,
}

impl FileFailure {
    /// Creates a failure record from an error
    pub fn new(path: impl Into<PathBuf>, stage: Stage, error: &ScrubError) -> Self {
        Self {
            path: path.into(),
            stage,
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }

    /// Creates a failure record from a free-form message
    pub fn message(path: impl Into<PathBuf>, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stage,
            kind: "other".to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.path.display(),
            self.stage,
            self.reason
        )
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for ScrubError {
    fn from(err: std::io::Error) -> Self {
        ScrubError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ScrubError {
    fn from(err: serde_json::Error) -> Self {
        ScrubError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for ScrubError {
    fn from(err: toml::de::Error) -> Self {
        ScrubError::Configuration(format!("TOML parse error: {err}"))
    }
}
