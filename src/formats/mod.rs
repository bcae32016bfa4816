//! Vendor format handlers
//!
//! Each handler knows how to detect, scan, redact and describe one slide
//! format. Handlers are tried in a fixed priority order and the first one
//! that claims a file wins, so vendor-specific TIFF variants are matched
//! before the generic TIFF fallback.

pub mod bif;
pub mod dicom;
pub mod generic_tiff;
pub mod mrxs;
pub mod ndpi;
pub mod patch;
pub mod scn;
pub mod svs;
pub mod tiff_common;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::Secret;

use crate::config::{SecretString, SecretValue};
use crate::detector::{PatternScanner, SWEEP_WINDOW};
use crate::domain::{FormatInfo, FormatKind, MutationPlan, PhiFinding, Result, ScrubError};

/// Settings shared by every scan
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub scanner: PatternScanner,
    /// Bytes covered by the raw safety sweep
    pub sweep_window: u64,
}

impl ScanOptions {
    pub fn new(scanner: PatternScanner) -> Self {
        Self {
            scanner,
            sweep_window: SWEEP_WINDOW,
        }
    }
}

/// Settings for applying a plan
#[derive(Clone)]
pub struct RedactOptions {
    /// Remove blanked auxiliary directories from the chain
    pub unlink_auxiliary: bool,
    /// Key for identifier remapping
    pub uid_salt: SecretString,
}

impl RedactOptions {
    pub fn new(uid_salt: SecretString) -> Self {
        Self {
            unlink_auxiliary: true,
            uid_salt,
        }
    }
}

impl Default for RedactOptions {
    fn default() -> Self {
        Self::new(Secret::new(SecretValue::from(String::new())))
    }
}

impl std::fmt::Debug for RedactOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedactOptions")
            .field("unlink_auxiliary", &self.unlink_auxiliary)
            .field("uid_salt", &"[REDACTED]")
            .finish()
    }
}

/// Result of applying a plan
///
/// Actions run in plan order. `applied` counts the actions that completed
/// before `error`, so the rest of the plan is still pending.
#[derive(Debug, Default)]
pub struct RedactOutcome {
    pub applied: usize,
    pub bytes_written: u64,
    pub error: Option<ScrubError>,
}

impl RedactOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// A slide format
pub trait FormatHandler: Send + Sync {
    /// Format this handler claims
    fn kind(&self) -> FormatKind;

    /// Whether this handler claims the file (extension plus signature)
    fn detect(&self, path: &Path) -> bool;

    /// Locate every finding in the file; read-only
    fn scan(&self, path: &Path, options: &ScanOptions) -> Result<Vec<PhiFinding>>;

    /// Apply a plan built from this handler's findings
    fn redact(&self, path: &Path, plan: &MutationPlan, options: &RedactOptions)
        -> RedactOutcome;

    /// Structural metadata snapshot
    fn info(&self, path: &Path) -> Result<FormatInfo>;

    /// SHA-256 per diagnostic region, keyed by a stable region name
    fn diagnostic_digests(&self, path: &Path) -> Result<BTreeMap<String, String>>;

    /// Companion directory that travels with the file, if any
    fn companion_dir(&self, _path: &Path) -> Option<PathBuf> {
        None
    }
}

/// Fixed-priority handler registry
#[derive(Clone)]
pub struct FormatRegistry {
    handlers: Vec<Arc<dyn FormatHandler>>,
}

impl FormatRegistry {
    /// All built-in handlers, most specific first
    pub fn new() -> Self {
        Self {
            handlers: vec![
                Arc::new(ndpi::NdpiHandler),
                Arc::new(svs::SvsHandler),
                Arc::new(bif::BifHandler),
                Arc::new(scn::ScnHandler),
                Arc::new(mrxs::MrxsHandler),
                Arc::new(dicom::DicomHandler),
                Arc::new(generic_tiff::GenericTiffHandler),
            ],
        }
    }

    /// First handler that claims the file
    pub fn handler_for(&self, path: &Path) -> Option<Arc<dyn FormatHandler>> {
        self.handlers.iter().find(|h| h.detect(path)).cloned()
    }

    /// Handler for a known format
    pub fn handler(&self, kind: FormatKind) -> Option<Arc<dyn FormatHandler>> {
        self.handlers.iter().find(|h| h.kind() == kind).cloned()
    }

    pub fn detect_format(&self, path: &Path) -> Option<FormatKind> {
        self.handler_for(path).map(|h| h.kind())
    }

    /// Supported format names in priority order
    pub fn formats(&self) -> Vec<FormatKind> {
        self.handlers.iter().map(|h| h.kind()).collect()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase extension of a path, without the dot
pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Whether the path has one of the format's extensions
pub(crate) fn has_extension(path: &Path, kind: FormatKind) -> bool {
    extension(path).is_some_and(|ext| kind.extensions().contains(&ext.as_str()))
}

/// Sentinel fitted to `len` bytes: truncated, or padded with spaces
pub(crate) fn fit_sentinel(sentinel: &str, len: usize) -> Vec<u8> {
    let mut bytes: Vec<u8> = sentinel.bytes().take(len).collect();
    bytes.resize(len, b' ');
    bytes
}

/// Whether a text value was already replaced, either by 'X' fill or by
/// a (possibly truncated) sentinel
pub(crate) fn is_replaced(value: &str, sentinel: Option<&str>) -> bool {
    let value = value.trim();
    if value.is_empty() || value.bytes().all(|b| b == b'X') {
        return true;
    }
    sentinel.is_some_and(|s| s.starts_with(value))
}

/// First `n` bytes of a file (fewer if the file is shorter)
pub(crate) fn read_prefix(path: &Path, n: usize) -> Option<Vec<u8>> {
    use std::io::Read;
    let file = std::fs::File::open(path).ok()?;
    let mut buf = Vec::with_capacity(n);
    file.take(n as u64).read_to_end(&mut buf).ok()?;
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_detect_by_extension_and_signature() {
        let dir = tempfile::tempdir().unwrap();
        let tiff = [b'I', b'I', 42, 0, 8, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let registry = FormatRegistry::new();

        let ndpi = write_file(dir.path(), "a.ndpi", &tiff);
        assert_eq!(registry.detect_format(&ndpi), Some(FormatKind::Ndpi));

        let svs = write_file(dir.path(), "a.SVS", &tiff);
        assert_eq!(registry.detect_format(&svs), Some(FormatKind::Svs));

        let tif = write_file(dir.path(), "a.tif", &tiff);
        assert_eq!(registry.detect_format(&tif), Some(FormatKind::Tiff));

        let fake = write_file(dir.path(), "a.tif", b"not a tiff at all");
        assert_eq!(registry.detect_format(&fake), None);

        let txt = write_file(dir.path(), "notes.txt", b"hello");
        assert_eq!(registry.detect_format(&txt), None);
    }

    #[test]
    fn test_sentinel_fitting() {
        assert_eq!(fit_sentinel("01/01/00", 10), b"01/01/00  ");
        assert_eq!(fit_sentinel("01/01/00", 6), b"01/01/");
        assert!(is_replaced("01/01/", Some("01/01/00")));
        assert!(is_replaced("XXXXXX", None));
        assert!(is_replaced("  ", None));
        assert!(!is_replaced("12/29/09", Some("01/01/00")));
    }

    #[test]
    fn test_priority_order() {
        let registry = FormatRegistry::new();
        assert_eq!(registry.formats(), FormatKind::ALL.to_vec());
    }
}
