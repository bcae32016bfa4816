//! Scan command implementation
//!
//! Reports PHI found in one or many slide files without writing anything.

use clap::Args;
use std::path::PathBuf;
use tokio::sync::watch;

use super::{apply_batch_overrides, batch_exit_code, discover, load_configuration, print_findings};
use crate::core::{BatchOperation, BatchProcessor, Scrubber};
use crate::domain::ScanResult;

/// Arguments for the scan command
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Files or directories to scan
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Descend into sub-directories
    #[arg(short, long)]
    pub recursive: bool,

    /// Only scan these formats (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub format: Vec<String>,

    /// Number of files scanned concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON batch report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

impl ScanArgs {
    /// Execute the scan command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(paths = ?self.paths, "Starting scan command");

        let Some(mut config) = load_configuration(config_path) else {
            return Ok(2); // Configuration error exit code
        };
        if let Err(e) = apply_batch_overrides(&mut config, self.recursive, &self.format, self.workers)
        {
            eprintln!("❌ Invalid options: {e}");
            return Ok(2);
        }

        let scrubber = Scrubber::from_config(&config)?;
        let files = discover(&self.paths, &config)?;

        if files.is_empty() {
            println!("No supported slide files found");
            return Ok(0);
        }

        // a single named file gets the detailed report
        if files.len() == 1 && self.paths.len() == 1 && self.paths[0].is_file() {
            let result = scrubber.scan(&files[0]);
            return self.report_single(&result);
        }

        let processor = BatchProcessor::new(scrubber, config.batch.workers);
        let summary = processor
            .run(files, BatchOperation::Scan, shutdown_signal)
            .await;

        if let Some(report) = &self.report {
            summary.write_report(report)?;
        }
        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            println!("🔍 Scanned {} file(s)", summary.total_files);
            for file in &summary.files {
                println!(
                    "  {:?} {} ({} finding(s), {} external)",
                    file.status,
                    file.path.display(),
                    file.findings,
                    file.external
                );
            }
            println!();
            println!("  PHI found: {}", summary.phi_found);
            println!("  Clean: {}", summary.already_clean);
            println!("  Errors: {}", summary.errored);
            if summary.skipped > 0 {
                println!("  Skipped: {}", summary.skipped);
            }
        }
        Ok(batch_exit_code(&summary))
    }

    fn report_single(&self, result: &ScanResult) -> anyhow::Result<i32> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(result)?);
        } else {
            let format = result
                .format
                .map(|f| f.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("🔍 {} ({format})", result.path.display());
            if let Some(error) = &result.error {
                println!("❌ Scan failed: {error}");
            } else if result.findings.is_empty() {
                println!("✅ No PHI found");
            } else {
                println!("⚠️  {} finding(s):", result.findings.len());
                print_findings(&result.findings);
            }
        }

        Ok(if result.is_error() {
            3 // File failed
        } else if result.is_clean() {
            0
        } else {
            1 // PHI found
        })
    }
}
