//! Core business logic for slidescrub.
//!
//! This module ties the format handlers together into the operations the
//! CLI and library users call.
//!
//! # Modules
//!
//! - [`scrubber`] - Detection, scanning, planning and verification facade
//! - [`anonymize`] - Plan application, in place or copy-then-mutate
//! - [`verification`] - Re-scan outcomes and diagnostic fingerprints
//! - [`batch`] - Discovery and a bounded worker pool for many files
//! - [`audit`] - JSONL audit trail
//!
//! # Workflow
//!
//! 1. **Detect**: the first handler in priority order that claims the file
//! 2. **Scan**: every finding, with the redaction that removes it
//! 3. **Plan**: deduplicated redactions ([`MutationPlan`](crate::domain::MutationPlan))
//! 4. **Apply**: byte-exact overwrites, optionally on a copy
//! 5. **Check**: diagnostic fingerprints unchanged, re-scan clean
//!
//! # Example
//!
//! ```rust,no_run
//! use slidescrub::core::{self, AnonymizeMode};
//!
//! # fn example() -> slidescrub::domain::Result<()> {
//! let scan = core::scan("slide.svs");
//! println!("{} findings", scan.findings.len());
//!
//! let record = core::anonymize("slide.svs", AnonymizeMode::Copy("out/slide.svs".into()))?;
//! println!("{} redactions applied", record.actions_applied);
//!
//! assert!(core::verify("out/slide.svs")?.clean);
//! # Ok(())
//! # }
//! ```

pub mod anonymize;
pub mod audit;
pub mod batch;
pub mod scrubber;
pub mod verification;

use std::path::Path;

pub use anonymize::{AnonymizeError, AnonymizeMode, Anonymizer};
pub use audit::AuditLogger;
pub use batch::{BatchOperation, BatchProcessor, BatchSummary, ComplianceCertificate};
pub use scrubber::{ScrubSettings, Scrubber};
pub use verification::{Fingerprint, VerificationOutcome, VerificationReport};

use crate::domain::{FormatInfo, FormatKind, MutationRecord, Result, ScanResult};
use crate::formats::FormatRegistry;

/// Format of a file, if any handler claims it
pub fn detect_format(path: impl AsRef<Path>) -> Option<FormatKind> {
    FormatRegistry::new().detect_format(path.as_ref())
}

/// Scan a file with default settings; failures yield an error result
pub fn scan(path: impl AsRef<Path>) -> ScanResult {
    let path = path.as_ref();
    match Scrubber::new() {
        Ok(scrubber) => scrubber.scan(path),
        Err(e) => ScanResult::failed(path, detect_format(path), &e),
    }
}

/// Scan, plan and apply with default settings
pub fn anonymize(path: impl AsRef<Path>, mode: AnonymizeMode) -> Result<MutationRecord> {
    Scrubber::new()?.anonymize(path, mode)
}

/// Re-scan a file and report whether anything redactable remains
pub fn verify(path: impl AsRef<Path>) -> Result<VerificationOutcome> {
    Scrubber::new()?.verify(path)
}

/// Structural snapshot with a clean/dirty verdict
pub fn get_info(path: impl AsRef<Path>) -> Result<FormatInfo> {
    Scrubber::new()?.info(path)
}

/// SHA-256 per diagnostic region
pub fn fingerprint_diagnostic_regions(path: impl AsRef<Path>) -> Result<Fingerprint> {
    Scrubber::new()?.fingerprint(path)
}
