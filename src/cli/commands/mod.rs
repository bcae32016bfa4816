//! CLI command implementations
//!
//! This module contains all CLI command implementations and the helpers
//! they share.

pub mod anonymize;
pub mod info;
pub mod init;
pub mod scan;
pub mod validate;
pub mod verify;

use std::path::PathBuf;
use std::str::FromStr;

use crate::config::{load_config_or_default, ScrubConfig};
use crate::core::batch::{discover_files, BatchSummary};
use crate::domain::{FormatKind, PhiFinding};
use crate::formats::FormatRegistry;

/// Load the configuration, or print why it failed
///
/// `None` means the command should exit with code 2.
pub(crate) fn load_configuration(config_path: &str) -> Option<ScrubConfig> {
    match load_config_or_default(config_path) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::error!(error = %e, config_path = %config_path, "Failed to load configuration");
            eprintln!("❌ Failed to load configuration: {e}");
            None
        }
    }
}

/// Apply the shared batch overrides from the command line
pub(crate) fn apply_batch_overrides(
    config: &mut ScrubConfig,
    recursive: bool,
    formats: &[String],
    workers: Option<usize>,
) -> Result<(), String> {
    if recursive {
        config.batch.recursive = true;
    }
    if !formats.is_empty() {
        for format in formats {
            FormatKind::from_str(format).map_err(|_| format!("Unknown format '{format}'"))?;
        }
        config.batch.formats = formats.to_vec();
    }
    if let Some(workers) = workers {
        tracing::info!(workers, "Overriding worker count from CLI");
        config.batch.workers = workers;
    }
    config.validate()
}

/// Supported files under every input path, deduplicated
pub(crate) fn discover(inputs: &[PathBuf], config: &ScrubConfig) -> anyhow::Result<Vec<PathBuf>> {
    let registry = FormatRegistry::new();
    let filter = config.batch.format_filter();
    let mut files = Vec::new();
    for input in inputs {
        files.extend(discover_files(
            input,
            config.batch.recursive,
            &filter,
            &registry,
        )?);
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Exit code for a batch run: failures win over findings
pub(crate) fn batch_exit_code(summary: &BatchSummary) -> i32 {
    if !summary.is_successful() {
        3 // Some files failed
    } else if summary.has_phi() {
        1 // PHI found
    } else {
        0
    }
}

/// One indented line per finding
pub(crate) fn print_findings(findings: &[PhiFinding]) {
    for finding in findings {
        println!(
            "   - [{}] {}: {}",
            finding.category.label(),
            finding.label,
            finding.preview
        );
    }
}
