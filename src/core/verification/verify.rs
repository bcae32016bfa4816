//! Verification outcome of a re-scan

use std::path::PathBuf;

use serde::Serialize;

use crate::domain::{FormatKind, PhiFinding, ScanResult};

/// Result of verifying one file
///
/// `clean` means the scan succeeded and found nothing the engine could
/// redact. Filename and sidecar findings need an outside collaborator and
/// are reported separately in `external`.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    /// Verified file
    pub path: PathBuf,

    /// Detected format
    pub format: Option<FormatKind>,

    /// Nothing redactable remains
    pub clean: bool,

    /// Redactable findings still present
    pub findings: Vec<PhiFinding>,

    /// Findings left to an outside collaborator
    pub external: Vec<PhiFinding>,
}

impl VerificationOutcome {
    pub fn from_scan(scan: ScanResult) -> Self {
        let (external, findings): (Vec<_>, Vec<_>) =
            scan.findings.into_iter().partition(|f| f.is_external());
        Self {
            clean: scan.error.is_none() && findings.is_empty(),
            path: scan.path,
            format: scan.format,
            findings,
            external,
        }
    }
}
