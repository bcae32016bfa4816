//! Batch summary and reporting

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{FileFailure, FormatKind, MutationRecord, PhiCategory, Result, ScanResult};

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Redactions applied
    Anonymized,
    /// Nothing to redact
    AlreadyClean,
    /// Dry run: redactions planned only
    Planned,
    /// Scan found PHI
    PhiFound,
    /// Scan found nothing
    Clean,
    /// Processing failed
    Failed,
    /// Not processed (cancelled)
    Skipped,
}

/// Per-file line of the batch report
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatKind>,

    pub status: FileStatus,

    /// Redactable findings (scan) or cleared findings (anonymize)
    pub findings: usize,

    /// Findings left to an outside collaborator
    pub external: usize,

    pub actions_applied: usize,

    /// Label, macro or thumbnail images blanked
    #[serde(skip_serializing_if = "is_zero")]
    pub images_blanked: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Re-scan of the output found nothing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,

    /// Diagnostic image fingerprint unchanged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_verified: Option<bool>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl FileReport {
    fn new(path: impl Into<PathBuf>, format: Option<FormatKind>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            format,
            status,
            findings: 0,
            external: 0,
            actions_applied: 0,
            images_blanked: 0,
            output: None,
            verified: None,
            integrity_verified: None,
        }
    }
}

/// Summary of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Run identifier, shared with the audit log
    pub run_id: Uuid,

    /// Operation name (scan, anonymize)
    pub operation: String,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Files handed to the pool
    pub total_files: usize,

    /// Files with redactions applied
    pub anonymized: usize,

    /// Files that needed no change (or scanned clean)
    pub already_clean: usize,

    /// Files where a scan found PHI, or a dry run planned redactions
    pub phi_found: usize,

    /// Files that failed
    pub errored: usize,

    /// Files not processed because of cancellation
    pub skipped: usize,

    /// Findings across all files
    pub findings_total: usize,

    /// Duration of the run
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,

    /// Per-file outcomes
    pub files: Vec<FileReport>,

    /// Failure details
    pub failures: Vec<FileFailure>,
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl BatchSummary {
    /// Create a new empty summary
    pub fn new(run_id: Uuid, operation: impl Into<String>) -> Self {
        Self {
            run_id,
            operation: operation.into(),
            started_at: Utc::now(),
            total_files: 0,
            anonymized: 0,
            already_clean: 0,
            phi_found: 0,
            errored: 0,
            skipped: 0,
            findings_total: 0,
            duration: Duration::from_secs(0),
            files: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Record a scan result; failed scans count as errors
    pub fn record_scan(&mut self, scan: &ScanResult, failure: Option<FileFailure>) {
        self.total_files += 1;
        if let Some(failure) = failure {
            self.push_failure(&scan.path, scan.format, failure);
            return;
        }
        let status = if scan.is_clean() {
            self.already_clean += 1;
            FileStatus::Clean
        } else {
            self.phi_found += 1;
            FileStatus::PhiFound
        };
        self.findings_total += scan.findings.len();
        let mut report = FileReport::new(&scan.path, scan.format, status);
        report.findings = scan.redactable().count();
        report.external = scan.external().count();
        self.files.push(report);
    }

    /// Record an anonymization record
    pub fn record_anonymized(&mut self, record: &MutationRecord) {
        self.total_files += 1;
        let status = if record.dry_run {
            self.phi_found += 1;
            FileStatus::Planned
        } else if record.already_clean {
            self.already_clean += 1;
            FileStatus::AlreadyClean
        } else {
            self.anonymized += 1;
            FileStatus::Anonymized
        };
        self.findings_total += record.findings_cleared() + record.external.len();
        let mut report = FileReport::new(&record.source, Some(record.format), status);
        report.findings = record.findings_cleared();
        report.external = record.external.len();
        report.actions_applied = record.actions_applied;
        report.images_blanked = record
            .cleared
            .iter()
            .filter(|f| f.category == PhiCategory::AuxiliaryImage)
            .count();
        report.verified = if record.already_clean {
            Some(true)
        } else {
            record.verified
        };
        report.integrity_verified = record.integrity_verified;
        if status == FileStatus::Anonymized && record.source != record.output {
            report.output = Some(record.output.clone());
        }
        self.files.push(report);
    }

    /// Record a failed file
    pub fn record_failure(&mut self, failure: FileFailure, format: Option<FormatKind>) {
        self.total_files += 1;
        let path = failure.path.clone();
        self.push_failure(&path, format, failure);
    }

    /// Record a file skipped by cancellation
    pub fn record_skipped(&mut self, path: impl Into<PathBuf>) {
        self.total_files += 1;
        self.skipped += 1;
        self.files
            .push(FileReport::new(path, None, FileStatus::Skipped));
    }

    fn push_failure(&mut self, path: &Path, format: Option<FormatKind>, failure: FileFailure) {
        self.errored += 1;
        self.files
            .push(FileReport::new(path, format, FileStatus::Failed));
        self.failures.push(failure);
    }

    /// No file failed
    pub fn is_successful(&self) -> bool {
        self.errored == 0
    }

    /// Any file still holds PHI (or would, after a dry run)
    pub fn has_phi(&self) -> bool {
        self.phi_found > 0
    }

    /// Sort per-file lines by path; workers finish in any order
    pub fn sort(&mut self) {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
        self.failures.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Write the summary as pretty JSON
    pub fn write_report(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Batch report written");
        Ok(())
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            run_id = %self.run_id,
            operation = %self.operation,
            total = self.total_files,
            anonymized = self.anonymized,
            already_clean = self.already_clean,
            phi_found = self.phi_found,
            errored = self.errored,
            skipped = self.skipped,
            duration_ms = self.duration.as_millis() as u64,
            "Batch completed"
        );

        for failure in &self.failures {
            tracing::warn!(
                path = %failure.path.display(),
                stage = %failure.stage,
                kind = %failure.kind,
                reason = %failure.reason,
                "File failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OutputMode, ScrubError, Stage};

    #[test]
    fn test_counts_per_outcome() {
        let mut summary = BatchSummary::new(Uuid::new_v4(), "anonymize");

        let mut done = MutationRecord::new("a.svs", "out/a.svs", OutputMode::Copy, FormatKind::Svs);
        done.actions_applied = 2;
        summary.record_anonymized(&done);

        let mut clean = MutationRecord::new("b.svs", "b.svs", OutputMode::InPlace, FormatKind::Svs);
        clean.already_clean = true;
        summary.record_anonymized(&clean);

        summary.record_failure(
            FileFailure::new("c.svs", Stage::Copy, &ScrubError::Io("disk full".to_string())),
            Some(FormatKind::Svs),
        );
        summary.record_skipped("d.svs");

        assert_eq!(summary.total_files, 4);
        assert_eq!(summary.anonymized, 1);
        assert_eq!(summary.already_clean, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.is_successful());
        assert_eq!(summary.files[0].output, Some(PathBuf::from("out/a.svs")));
    }

    #[test]
    fn test_failed_scan_is_not_clean() {
        let mut summary = BatchSummary::new(Uuid::new_v4(), "scan");
        let error = ScrubError::UnsupportedFormat("x".to_string());
        let scan = ScanResult::failed("x.tif", None, &error);
        summary.record_scan(&scan, Some(FileFailure::new("x.tif", Stage::Scan, &error)));
        assert_eq!(summary.already_clean, 0);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.files[0].status, FileStatus::Failed);
    }

    #[test]
    fn test_report_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut summary = BatchSummary::new(Uuid::new_v4(), "scan")
            .with_duration(Duration::from_millis(1500));
        summary.record_skipped("z.svs");
        let path = dir.path().join("reports/batch.json");
        summary.write_report(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["duration_ms"], 1500);
        assert_eq!(value["skipped"], 1);
        assert_eq!(value["files"][0]["status"], "skipped");
    }
}
