//! Mutation plans and records
//!
//! A [`MutationPlan`] is the deduplicated list of redactions derived from a
//! scan. A [`MutationRecord`] describes what an anonymization run actually did.

use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

use super::errors::{ParseError, ScrubError};
use super::finding::{FormatKind, PhiFinding, Redaction, ScanResult};
use super::result::Result;

/// Redactions to apply to one file, in discovery order
#[derive(Debug, Clone)]
pub struct MutationPlan {
    /// File the plan was built for
    pub path: PathBuf,

    /// Format of the file
    pub format: FormatKind,

    /// Findings the engine can clear
    pub findings: Vec<PhiFinding>,

    /// Unique redactions, in first-seen order
    pub actions: Vec<Redaction>,

    /// Findings only an outside collaborator can act on
    pub external: Vec<PhiFinding>,
}

impl MutationPlan {
    /// Build a plan from a successful scan
    ///
    /// A failed scan never produces a plan: a file that cannot be fully
    /// parsed cannot be proven clean after mutation.
    pub fn from_scan(scan: &ScanResult) -> Result<Self> {
        if let Some(error) = &scan.error {
            return Err(ScrubError::Parse(ParseError::MalformedDocument(format!(
                "cannot plan redactions for a failed scan: {error}"
            ))));
        }
        let format = scan
            .format
            .ok_or_else(|| ScrubError::UnsupportedFormat(scan.path.display().to_string()))?;

        let mut seen = HashSet::new();
        let mut actions = Vec::new();
        let mut findings = Vec::new();
        let mut external = Vec::new();

        for finding in &scan.findings {
            match finding.redaction() {
                Some(redaction) => {
                    if seen.insert(redaction.dedup_key()) {
                        actions.push(redaction.clone());
                    }
                    findings.push(finding.clone());
                }
                None => external.push(finding.clone()),
            }
        }

        Ok(Self {
            path: scan.path.clone(),
            format,
            findings,
            actions,
            external,
        })
    }

    /// True when there is nothing the engine can do
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

/// How the output was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Output is a fresh copy; the source is untouched
    Copy,
    /// Source file mutated directly
    InPlace,
}

/// What an anonymization run did to one file
#[derive(Debug, Clone, Serialize)]
pub struct MutationRecord {
    /// Input file
    pub source: PathBuf,

    /// File that was (or would be) mutated
    pub output: PathBuf,

    /// Copy or in-place
    pub mode: OutputMode,

    /// Detected format
    pub format: FormatKind,

    /// Findings whose redaction was applied
    pub cleared: Vec<PhiFinding>,

    /// Number of unique redactions applied
    pub actions_applied: usize,

    /// Descriptions of redactions that were not applied (in-place failure)
    pub pending: Vec<String>,

    /// Findings left to an outside collaborator
    pub external: Vec<PhiFinding>,

    /// Bytes rewritten in the primary file and companions
    pub bytes_written: u64,

    /// Nothing needed to change
    pub already_clean: bool,

    /// Plan computed but not applied
    pub dry_run: bool,

    /// Post-anonymization re-scan result (None when not run)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,

    /// Diagnostic image fingerprint matched (None when not checked)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_verified: Option<bool>,

    /// Wall-clock duration
    pub duration_ms: u64,
}

impl MutationRecord {
    pub fn new(
        source: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        mode: OutputMode,
        format: FormatKind,
    ) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            mode,
            format,
            cleared: Vec::new(),
            actions_applied: 0,
            pending: Vec::new(),
            external: Vec::new(),
            bytes_written: 0,
            already_clean: false,
            dry_run: false,
            verified: None,
            integrity_verified: None,
            duration_ms: 0,
        }
    }

    /// Total findings handled by this run
    pub fn findings_cleared(&self) -> usize {
        self.cleared.len()
    }
}
