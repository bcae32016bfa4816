//! Verification report structures
//!
//! Aggregates per-file verification outcomes for the `verify` command.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use super::verify::VerificationOutcome;
use crate::domain::{FileFailure, PhiCategory};

/// Results of verifying a set of files
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// When the verification was performed
    pub verified_at: DateTime<Utc>,

    /// Total number of files verified
    pub total_verified: usize,

    /// Files with nothing redactable left
    pub passed: usize,

    /// Files that still hold redactable findings
    pub failed: usize,

    /// Files that could not be verified (unsupported, unreadable, corrupt)
    pub errored: usize,

    /// Files with findings only an outside collaborator can fix
    pub needs_external: usize,

    /// Details of every file that did not pass
    pub failures: Vec<VerificationFailure>,

    /// Duration of verification in milliseconds
    pub duration_ms: u64,
}

/// Why a file did not pass verification
#[derive(Debug, Clone, Serialize)]
pub struct VerificationFailure {
    /// File path
    pub path: PathBuf,

    /// Labels of the remaining findings
    pub labels: Vec<String>,

    /// Categories of the remaining findings
    pub categories: Vec<PhiCategory>,

    /// Reason for failure
    pub reason: String,
}

impl VerificationReport {
    pub fn new() -> Self {
        Self {
            verified_at: Utc::now(),
            total_verified: 0,
            passed: 0,
            failed: 0,
            errored: 0,
            needs_external: 0,
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Record one outcome
    pub fn record(&mut self, outcome: &VerificationOutcome) {
        self.total_verified += 1;
        if !outcome.external.is_empty() {
            self.needs_external += 1;
        }
        if outcome.clean {
            self.passed += 1;
            return;
        }
        self.failed += 1;
        let mut categories: Vec<PhiCategory> = outcome.findings.iter().map(|f| f.category).collect();
        categories.sort();
        categories.dedup();
        self.failures.push(VerificationFailure {
            path: outcome.path.clone(),
            labels: outcome.findings.iter().map(|f| f.label.clone()).collect(),
            categories,
            reason: format!("{} finding(s) remain", outcome.findings.len()),
        });
    }

    /// Record a file that could not be verified
    pub fn record_error(&mut self, failure: &FileFailure) {
        self.total_verified += 1;
        self.errored += 1;
        self.failures.push(VerificationFailure {
            path: failure.path.clone(),
            labels: Vec::new(),
            categories: Vec::new(),
            reason: failure.reason.clone(),
        });
    }

    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    /// Every file verified and clean
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }

    /// Percentage of files that passed
    pub fn success_rate(&self) -> f64 {
        if self.total_verified == 0 {
            return 100.0;
        }
        (self.passed as f64 / self.total_verified as f64) * 100.0
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("📊 Verification Report\n");
        summary.push_str(&format!("  Verified at: {}\n", self.verified_at));
        summary.push_str(&format!("  Duration: {} ms\n", self.duration_ms));
        summary.push_str(&format!("  Total verified: {}\n", self.total_verified));
        summary.push_str(&format!("  ✅ Clean: {}\n", self.passed));
        summary.push_str(&format!("  ❌ PHI remaining: {}\n", self.failed));
        summary.push_str(&format!("  ⚠️  Errors: {}\n", self.errored));
        if self.needs_external > 0 {
            summary.push_str(&format!(
                "  📎 Filename or sidecar findings: {}\n",
                self.needs_external
            ));
        }
        summary.push_str(&format!("  Success rate: {:.2}%\n", self.success_rate()));

        if !self.failures.is_empty() {
            summary.push_str("\n❌ Failures:\n");
            for (i, failure) in self.failures.iter().enumerate() {
                summary.push_str(&format!("  {}. {}\n", i + 1, failure.path.display()));
                if !failure.labels.is_empty() {
                    summary.push_str(&format!("     Findings: {}\n", failure.labels.join(", ")));
                }
                summary.push_str(&format!("     Reason: {}\n", failure.reason));
            }
        }

        summary
    }
}

impl Default for VerificationReport {
    fn default() -> Self {
        Self::new()
    }
}
