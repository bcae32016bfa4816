//! Scrubber - entry point that ties detection, redaction and verification
//!
//! A [`Scrubber`] owns the format registry, the compiled pattern library and
//! the redaction settings. It is cheap to clone and safe to share across
//! batch workers.

use std::path::Path;
use std::time::Instant;

use crate::config::{secret_string, ScrubConfig};
use crate::core::anonymize::{AnonymizeError, AnonymizeMode, Anonymizer};
use crate::core::verification::{Fingerprint, VerificationOutcome};
use crate::detector::{PatternRegistry, PatternScanner};
use crate::domain::{
    FormatInfo, FormatKind, MutationPlan, MutationRecord, Result, ScanResult, ScrubError,
};
use crate::formats::{FormatHandler, FormatRegistry, RedactOptions, ScanOptions};
use std::sync::Arc;

/// Switches that change what an anonymization run does
#[derive(Debug, Clone)]
pub struct ScrubSettings {
    /// Report identifiers found in file names
    pub scan_filenames: bool,

    /// Re-scan the output after redaction
    pub verify: bool,

    /// Compare diagnostic fingerprints before and after
    pub verify_integrity: bool,

    /// Set output access and modification times to the epoch
    pub reset_timestamps: bool,

    /// Plan only, never write
    pub dry_run: bool,
}

impl Default for ScrubSettings {
    fn default() -> Self {
        Self {
            scan_filenames: true,
            verify: true,
            verify_integrity: true,
            reset_timestamps: false,
            dry_run: false,
        }
    }
}

/// Detection, redaction and verification for any supported slide format
#[derive(Clone)]
pub struct Scrubber {
    registry: FormatRegistry,
    scan_options: ScanOptions,
    redact_options: RedactOptions,
    settings: ScrubSettings,
}

impl Scrubber {
    /// Scrubber with the built-in pattern library and default settings
    pub fn new() -> Result<Self> {
        Ok(Self {
            registry: FormatRegistry::new(),
            scan_options: ScanOptions::new(PatternScanner::new()?),
            redact_options: RedactOptions::default(),
            settings: ScrubSettings::default(),
        })
    }

    /// Build a scrubber from a loaded configuration
    ///
    /// A configured pattern library is merged after the built-in rules.
    pub fn from_config(config: &ScrubConfig) -> Result<Self> {
        let scanner = match &config.scan.pattern_library {
            Some(library) => {
                tracing::info!(library = %library.display(), "Loading user pattern library");
                PatternScanner::with_registry(PatternRegistry::with_user_library(library)?)
            }
            None => PatternScanner::new()?,
        };
        let mut scan_options = ScanOptions::new(scanner);
        scan_options.sweep_window = config.scan.sweep_window_bytes;

        let salt = config
            .anonymize
            .uid_salt
            .clone()
            .unwrap_or_else(|| secret_string(String::new()));
        let mut redact_options = RedactOptions::new(salt);
        redact_options.unlink_auxiliary = config.anonymize.unlink_auxiliary;

        if config.anonymize.uid_salt.is_none() {
            tracing::debug!("No UID salt configured, DICOM UIDs are remapped with an empty key");
        }

        Ok(Self {
            registry: FormatRegistry::new(),
            scan_options,
            redact_options,
            settings: ScrubSettings {
                scan_filenames: config.scan.scan_filenames,
                verify: config.anonymize.verify,
                verify_integrity: config.anonymize.verify_integrity,
                reset_timestamps: config.anonymize.reset_timestamps,
                dry_run: config.application.dry_run,
            },
        })
    }

    /// Replace the run settings
    pub fn with_settings(mut self, settings: ScrubSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the redaction options
    pub fn with_redact_options(mut self, options: RedactOptions) -> Self {
        self.redact_options = options;
        self
    }

    pub fn settings(&self) -> &ScrubSettings {
        &self.settings
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub(crate) fn redact_options(&self) -> &RedactOptions {
        &self.redact_options
    }

    pub fn detect_format(&self, path: impl AsRef<Path>) -> Option<FormatKind> {
        self.registry.detect_format(path.as_ref())
    }

    /// Handler claiming the file
    pub(crate) fn handler_for(&self, path: &Path) -> Result<Arc<dyn FormatHandler>> {
        if !path.is_file() {
            return Err(ScrubError::Io(format!("{} is not a file", path.display())));
        }
        self.registry
            .handler_for(path)
            .ok_or_else(|| ScrubError::UnsupportedFormat(path.display().to_string()))
    }

    /// Scan a file, surfacing the first error
    pub fn try_scan(&self, path: impl AsRef<Path>) -> Result<ScanResult> {
        let path = path.as_ref();
        let handler = self.handler_for(path)?;
        self.scan_with(handler.as_ref(), path)
    }

    /// Scan with a known handler, skipping detection
    pub(crate) fn scan_with(&self, handler: &dyn FormatHandler, path: &Path) -> Result<ScanResult> {
        let start = Instant::now();
        let mut findings = handler.scan(path, &self.scan_options)?;
        if self.settings.scan_filenames {
            findings.extend(self.scan_options.scanner.scan_filename(path));
        }

        let mut result = ScanResult::new(path, handler.kind(), findings);
        result.file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        result.scan_time_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            path = %path.display(),
            format = %handler.kind(),
            findings = result.findings.len(),
            duration_ms = result.scan_time_ms,
            "Scan completed"
        );
        Ok(result)
    }

    /// Scan a file; failures become error results, which are never clean
    pub fn scan(&self, path: impl AsRef<Path>) -> ScanResult {
        let path = path.as_ref();
        match self.try_scan(path) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Scan failed");
                let mut result = ScanResult::failed(path, self.detect_format(path), &e);
                result.file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                result
            }
        }
    }

    /// Scan and build the redaction plan for a file
    pub fn plan(&self, path: impl AsRef<Path>) -> Result<MutationPlan> {
        let scan = self.try_scan(path)?;
        MutationPlan::from_scan(&scan)
    }

    /// Scan, plan and apply in one call
    pub fn anonymize(&self, path: impl AsRef<Path>, mode: AnonymizeMode) -> Result<MutationRecord> {
        Ok(self.anonymize_staged(path.as_ref(), &mode)?)
    }

    /// Like [`Scrubber::anonymize`] but keeps the failing stage
    pub fn anonymize_staged(
        &self,
        path: &Path,
        mode: &AnonymizeMode,
    ) -> std::result::Result<MutationRecord, AnonymizeError> {
        let plan = self
            .plan(path)
            .map_err(|e| AnonymizeError::new(crate::domain::Stage::Scan, e))?;
        Anonymizer::new(self).apply(path, &plan, mode)
    }

    /// Re-run the full scan and report whether anything redactable remains
    pub fn verify(&self, path: impl AsRef<Path>) -> Result<VerificationOutcome> {
        let scan = self.try_scan(path)?;
        Ok(VerificationOutcome::from_scan(scan))
    }

    /// SHA-256 of every diagnostic region of the file
    pub fn fingerprint(&self, path: impl AsRef<Path>) -> Result<Fingerprint> {
        let path = path.as_ref();
        let handler = self.handler_for(path)?;
        Ok(Fingerprint::new(
            path,
            handler.kind(),
            handler.diagnostic_digests(path)?,
        ))
    }

    /// Structural snapshot plus a clean/dirty verdict
    pub fn info(&self, path: impl AsRef<Path>) -> Result<FormatInfo> {
        let path = path.as_ref();
        let handler = self.handler_for(path)?;
        let mut info = handler.info(path)?;
        let scan = self.scan(path);
        info.clean = Some(!scan.is_error() && scan.redactable().next().is_none());
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::testutil::{build, TestField};
    use crate::domain::{PhiCategory, Stage};

    fn write(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_scan_reports_size_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build(vec![vec![TestField::ascii(285, "AS-24-123456")]]);
        let path = write(&dir, "slide.tif", &bytes);

        let scrubber = Scrubber::new().unwrap();
        let result = scrubber.scan(&path);
        assert_eq!(result.format, Some(FormatKind::Tiff));
        assert_eq!(result.file_size, bytes.len() as u64);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].category, PhiCategory::CaseNumber);
    }

    #[test]
    fn test_filename_findings_are_external() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build(vec![vec![TestField::long(256, &[512])]]);
        let path = write(&dir, "AS-24-123456.tif", &bytes);

        let scrubber = Scrubber::new().unwrap();
        let result = scrubber.scan(&path);
        assert!(result.external().count() >= 1);
        assert!(!result.is_clean());

        let outcome = scrubber.verify(&path).unwrap();
        assert!(outcome.clean);
        assert!(!outcome.external.is_empty());

        let quiet = Scrubber::new().unwrap().with_settings(ScrubSettings {
            scan_filenames: false,
            ..ScrubSettings::default()
        });
        assert!(quiet.scan(&path).external().next().is_none());
    }

    #[test]
    fn test_unsupported_and_missing_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let txt = write(&dir, "notes.txt", b"AS-24-123456");
        let scrubber = Scrubber::new().unwrap();

        let result = scrubber.scan(&txt);
        assert!(result.is_error());
        assert!(!result.is_clean());
        assert_eq!(result.error_kind.as_deref(), Some("unsupported_format"));

        let missing = scrubber.scan(dir.path().join("gone.svs"));
        assert!(missing.is_error());
        assert!(scrubber.verify(dir.path().join("gone.svs")).is_err());
    }

    #[test]
    fn test_anonymize_failure_keeps_stage() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "broken.tif", &[b'I', b'I', 42, 0, 0xF0, 0, 0, 0]);
        let err = Scrubber::new()
            .unwrap()
            .anonymize_staged(&path, &AnonymizeMode::InPlace)
            .unwrap_err();
        assert_eq!(err.stage, Stage::Scan);
    }

    #[test]
    fn test_info_reports_clean_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let dirty = write(
            &dir,
            "dirty.tif",
            &build(vec![vec![TestField::ascii(285, "AS-24-123456")]]),
        );
        let clean = write(
            &dir,
            "clean.tif",
            &build(vec![vec![TestField::long(256, &[512])]]),
        );
        let scrubber = Scrubber::new().unwrap();
        assert_eq!(scrubber.info(&dirty).unwrap().clean, Some(false));
        assert_eq!(scrubber.info(&clean).unwrap().clean, Some(true));
    }
}
