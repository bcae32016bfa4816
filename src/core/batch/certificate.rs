//! Compliance certificate for an anonymization run
//!
//! One JSON document listing, per output file, whether the re-scan came back
//! clean, whether the diagnostic image data was left untouched and the
//! SHA-256 of the file as written, plus the technical measures applied across
//! the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::summary::{BatchSummary, FileReport, FileStatus};
use crate::domain::{FormatKind, OutputMode, Result};

/// Outcome of one technical measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureStatus {
    Applied,
    NotNeeded,
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct Measure {
    pub measure: &'static str,
    pub status: MeasureStatus,
}

/// Run-level counters
#[derive(Debug, Clone, Serialize)]
pub struct CertificateSummary {
    pub total_files: usize,
    pub anonymized: usize,
    pub already_clean: usize,
    pub errors: usize,
    /// Every certified file re-scanned clean
    pub verified: bool,
    pub duration_ms: u64,
}

/// Certificate line for one file
#[derive(Debug, Clone, Serialize)]
pub struct CertifiedFile {
    pub source_path: PathBuf,
    pub output_path: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatKind>,

    pub findings_cleared: usize,
    pub images_blanked: usize,
    pub verified_clean: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_integrity_verified: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256_after: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceCertificate {
    pub certificate_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub tool_version: &'static str,
    /// Run identifier, shared with the batch report and audit log
    pub run_id: Uuid,
    pub mode: OutputMode,
    pub summary: CertificateSummary,
    pub measures: Vec<Measure>,
    pub files: Vec<CertifiedFile>,
}

impl ComplianceCertificate {
    /// Build the certificate for a finished anonymize run
    ///
    /// Output files are hashed as they are on disk now. Cancelled and
    /// dry-run entries are not certified.
    pub fn from_summary(summary: &BatchSummary, mode: OutputMode, timestamps_reset: bool) -> Self {
        let files: Vec<CertifiedFile> = summary
            .files
            .iter()
            .filter(|f| {
                matches!(
                    f.status,
                    FileStatus::Anonymized | FileStatus::AlreadyClean | FileStatus::Failed
                )
            })
            .map(|f| certify(summary, f))
            .collect();

        let verified = !files.is_empty() && files.iter().all(|f| f.verified_clean);
        let measures = measures(&summary.files, &files, verified, timestamps_reset);

        Self {
            certificate_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION"),
            run_id: summary.run_id,
            mode,
            summary: CertificateSummary {
                total_files: summary.total_files,
                anonymized: summary.anonymized,
                already_clean: summary.already_clean,
                errors: summary.errored,
                verified,
                duration_ms: summary.duration.as_millis() as u64,
            },
            measures,
            files,
        }
    }

    /// Write the certificate as pretty JSON
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(
            path = %path.display(),
            certificate_id = %self.certificate_id,
            files = self.files.len(),
            "Compliance certificate written"
        );
        Ok(())
    }
}

fn certify(summary: &BatchSummary, report: &FileReport) -> CertifiedFile {
    let output_path = report.output.clone().unwrap_or_else(|| report.path.clone());
    let error = (report.status == FileStatus::Failed).then(|| {
        summary
            .failures
            .iter()
            .find(|f| f.path == report.path)
            .map_or_else(|| "processing failed".to_string(), ToString::to_string)
    });

    let sha256_after = if error.is_some() {
        None
    } else {
        match sha256_file(&output_path) {
            Ok(digest) => Some(digest),
            Err(e) => {
                tracing::warn!(path = %output_path.display(), error = %e, "Cannot hash output");
                None
            }
        }
    };

    CertifiedFile {
        source_path: report.path.clone(),
        output_path,
        format: report.format,
        findings_cleared: report.findings,
        images_blanked: report.images_blanked,
        verified_clean: report.verified == Some(true),
        image_integrity_verified: report.integrity_verified,
        sha256_after,
        error,
    }
}

fn measures(
    reports: &[FileReport],
    files: &[CertifiedFile],
    verified: bool,
    timestamps_reset: bool,
) -> Vec<Measure> {
    let applied_if = |done: bool| {
        if done {
            MeasureStatus::Applied
        } else {
            MeasureStatus::NotNeeded
        }
    };
    let fields_cleared = reports
        .iter()
        .any(|r| r.status == FileStatus::Anonymized && r.findings > r.images_blanked);
    let images_blanked = reports.iter().any(|r| r.images_blanked > 0);

    let verification = if verified {
        MeasureStatus::Passed
    } else {
        MeasureStatus::Skipped
    };

    let mut measures = vec![
        Measure {
            measure: "Metadata fields cleared",
            status: applied_if(fields_cleared),
        },
        Measure {
            measure: "Label and macro images blanked",
            status: applied_if(images_blanked),
        },
        Measure {
            measure: "Post-anonymization verification",
            status: verification,
        },
    ];

    let integrity: Vec<bool> = files.iter().filter_map(|f| f.image_integrity_verified).collect();
    if !integrity.is_empty() {
        measures.push(Measure {
            measure: "Diagnostic image integrity (SHA-256)",
            status: if integrity.iter().all(|ok| *ok) {
                MeasureStatus::Passed
            } else {
                MeasureStatus::Failed
            },
        });
    }
    if timestamps_reset {
        measures.push(Measure {
            measure: "Filesystem timestamps reset",
            status: MeasureStatus::Applied,
        });
    }
    measures
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        FileFailure, Location, MutationRecord, PhiCategory, PhiFinding, ScrubError, Stage,
    };

    fn finding(category: PhiCategory) -> PhiFinding {
        PhiFinding::new(category, "test", Location::Bytes { offset: 8, length: 4 }, "")
    }

    fn anonymized(dir: &Path, name: &str) -> MutationRecord {
        let output = dir.join(name);
        std::fs::write(&output, b"abc").unwrap();
        let mut record = MutationRecord::new(dir.join("in").join(name), &output, OutputMode::Copy, FormatKind::Svs);
        record.cleared = vec![
            finding(PhiCategory::CaseNumber),
            finding(PhiCategory::AuxiliaryImage),
        ];
        record.actions_applied = 2;
        record.verified = Some(true);
        record.integrity_verified = Some(true);
        record
    }

    #[test]
    fn test_certifies_written_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut summary = BatchSummary::new(Uuid::new_v4(), "anonymize");
        summary.record_anonymized(&anonymized(dir.path(), "a.svs"));

        let certificate = ComplianceCertificate::from_summary(&summary, OutputMode::Copy, false);
        assert_eq!(certificate.run_id, summary.run_id);
        assert!(certificate.summary.verified);

        let file = &certificate.files[0];
        assert_eq!(file.output_path, dir.path().join("a.svs"));
        assert!(file.verified_clean);
        assert_eq!(file.image_integrity_verified, Some(true));
        assert_eq!(file.images_blanked, 1);
        assert_eq!(
            file.sha256_after.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );

        let status = |name: &str| {
            certificate
                .measures
                .iter()
                .find(|m| m.measure == name)
                .map(|m| m.status)
        };
        assert_eq!(status("Metadata fields cleared"), Some(MeasureStatus::Applied));
        assert_eq!(status("Label and macro images blanked"), Some(MeasureStatus::Applied));
        assert_eq!(status("Post-anonymization verification"), Some(MeasureStatus::Passed));
        assert_eq!(
            status("Diagnostic image integrity (SHA-256)"),
            Some(MeasureStatus::Passed)
        );
        assert_eq!(status("Filesystem timestamps reset"), None);
    }

    #[test]
    fn test_failed_file_carries_error_and_no_digest() {
        let dir = tempfile::tempdir().unwrap();
        let mut summary = BatchSummary::new(Uuid::new_v4(), "anonymize");
        summary.record_anonymized(&anonymized(dir.path(), "a.svs"));
        let error = ScrubError::IntegrityMismatch("ifd@8".to_string());
        summary.record_failure(
            FileFailure::new(dir.path().join("b.svs"), Stage::Integrity, &error),
            Some(FormatKind::Svs),
        );
        summary.record_skipped(dir.path().join("c.svs"));

        let certificate = ComplianceCertificate::from_summary(&summary, OutputMode::Copy, true);
        assert_eq!(certificate.files.len(), 2);
        assert_eq!(certificate.summary.errors, 1);
        assert!(!certificate.summary.verified);

        let failed = &certificate.files[1];
        assert!(failed.error.is_some());
        assert!(failed.sha256_after.is_none());
        assert!(!failed.verified_clean);
        assert!(certificate
            .measures
            .iter()
            .any(|m| m.measure == "Filesystem timestamps reset" && m.status == MeasureStatus::Applied));
    }

    #[test]
    fn test_already_clean_in_place_hashes_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.svs");
        std::fs::write(&path, b"abc").unwrap();
        let mut record = MutationRecord::new(&path, &path, OutputMode::InPlace, FormatKind::Svs);
        record.already_clean = true;
        let mut summary = BatchSummary::new(Uuid::new_v4(), "anonymize");
        summary.record_anonymized(&record);

        let certificate = ComplianceCertificate::from_summary(&summary, OutputMode::InPlace, false);
        let file = &certificate.files[0];
        assert_eq!(file.output_path, path);
        assert!(file.verified_clean);
        assert!(file.sha256_after.is_some());
        assert_eq!(certificate.measures[0].status, MeasureStatus::NotNeeded);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut summary = BatchSummary::new(Uuid::new_v4(), "anonymize");
        summary.record_anonymized(&anonymized(dir.path(), "a.svs"));
        let path = dir.path().join("certs/run.json");
        ComplianceCertificate::from_summary(&summary, OutputMode::Copy, false)
            .write(&path)
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["mode"], "copy");
        assert_eq!(value["files"][0]["verified_clean"], true);
        assert_eq!(value["measures"][2]["status"], "passed");
    }
}
