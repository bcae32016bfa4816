//! Verify command implementation
//!
//! Re-scans files and reports whether anything redactable is left.

use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::watch;

use super::{apply_batch_overrides, discover, load_configuration, print_findings};
use crate::core::{Scrubber, VerificationReport};
use crate::domain::{FileFailure, Stage};

/// Arguments for the verify command
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Files or directories to verify
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Descend into sub-directories
    #[arg(short, long)]
    pub recursive: bool,

    /// Only verify these formats (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub format: Vec<String>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl VerifyArgs {
    /// Execute the verify command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(paths = ?self.paths, "Starting verify command");

        let Some(mut config) = load_configuration(config_path) else {
            return Ok(2); // Configuration error exit code
        };
        if let Err(e) = apply_batch_overrides(&mut config, self.recursive, &self.format, None) {
            eprintln!("❌ Invalid options: {e}");
            return Ok(2);
        }

        let scrubber = Scrubber::from_config(&config)?;
        let files = discover(&self.paths, &config)?;
        let start = Instant::now();

        let report = tokio::task::spawn_blocking(move || {
            let mut report = VerificationReport::new();
            for file in files {
                if *shutdown_signal.borrow() {
                    tracing::warn!("Shutdown requested, verification stopped");
                    break;
                }
                match scrubber.verify(&file) {
                    Ok(outcome) => {
                        if !outcome.clean && !outcome.findings.is_empty() {
                            println!("❌ {}", outcome.path.display());
                            print_findings(&outcome.findings);
                        }
                        report.record(&outcome);
                    }
                    Err(e) => {
                        tracing::warn!(path = %file.display(), error = %e, "Verification failed");
                        report.record_error(&FileFailure::new(&file, Stage::Verify, &e));
                    }
                }
            }
            report
        })
        .await?;

        let mut report = report;
        report.set_duration(start.elapsed().as_millis() as u64);

        tracing::info!(
            passed = report.passed,
            failed = report.failed,
            errored = report.errored,
            duration_ms = report.duration_ms,
            "Verification completed"
        );

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{}", report.format_summary());
        }

        Ok(if report.errored > 0 {
            3 // Some files failed
        } else if report.failed > 0 {
            1 // PHI found
        } else {
            0
        })
    }
}
