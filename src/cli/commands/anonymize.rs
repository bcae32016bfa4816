//! Anonymize command implementation
//!
//! Redacts PHI from one or many slides, either in place or into an output
//! location, and reports per-file outcomes.

use clap::Args;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use uuid::Uuid;

use super::{apply_batch_overrides, batch_exit_code, discover, load_configuration};
use crate::core::{
    AuditLogger, BatchOperation, BatchProcessor, BatchSummary, ComplianceCertificate, Scrubber,
};
use crate::domain::OutputMode;

/// Arguments for the anonymize command
#[derive(Args, Debug)]
pub struct AnonymizeArgs {
    /// Files or directories to anonymize
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Output file (single input) or directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Modify the inputs directly
    #[arg(long, conflicts_with = "output")]
    pub in_place: bool,

    /// Plan redactions without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Descend into sub-directories
    #[arg(short, long)]
    pub recursive: bool,

    /// Only anonymize these formats (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub format: Vec<String>,

    /// Number of files processed concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON batch report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Write a JSON compliance certificate for the written files
    #[arg(long, value_name = "FILE")]
    pub certificate: Option<PathBuf>,

    /// Skip the re-scan of outputs
    #[arg(long)]
    pub no_verify: bool,

    /// Set output access and modification times to the epoch
    #[arg(long)]
    pub reset_timestamps: bool,
}

impl AnonymizeArgs {
    /// Execute the anonymize command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(paths = ?self.paths, dry_run = self.dry_run, "Starting anonymize command");

        let Some(mut config) = load_configuration(config_path) else {
            return Ok(2); // Configuration error exit code
        };
        if let Err(e) = apply_batch_overrides(&mut config, self.recursive, &self.format, self.workers)
        {
            eprintln!("❌ Invalid options: {e}");
            return Ok(2);
        }

        let dry_run = self.dry_run || config.application.dry_run;
        if self.output.is_none() && !self.in_place && !dry_run {
            eprintln!("❌ Choose an output with --output, or pass --in-place or --dry-run");
            return Ok(2);
        }

        let scrubber = Scrubber::from_config(&config)?;
        let mut settings = scrubber.settings().clone();
        settings.dry_run = dry_run;
        if self.no_verify {
            settings.verify = false;
        }
        if self.reset_timestamps {
            settings.reset_timestamps = true;
        }
        let timestamps_reset = settings.reset_timestamps;
        let scrubber = scrubber.with_settings(settings);

        let files = discover(&self.paths, &config)?;
        if files.is_empty() {
            println!("No supported slide files found");
            return Ok(0);
        }

        if dry_run {
            println!("🧪 Dry run: nothing will be written");
        }

        let mut processor = BatchProcessor::new(scrubber, config.batch.workers);
        if let Some(audit) = AuditLogger::from_config(&config.audit, Uuid::new_v4())? {
            tracing::info!(path = %audit.log_path().display(), "Audit log enabled");
            processor = processor.with_audit(audit);
        }
        if let [root] = self.paths.as_slice() {
            if root.is_dir() {
                processor = processor.with_input_root(root);
            }
        }

        let summary = match self.single_destination(&files) {
            Some(destination) => {
                processor
                    .anonymize_to(files[0].clone(), destination)
                    .await
            }
            None => {
                let operation = BatchOperation::Anonymize {
                    output_dir: self.output.clone(),
                };
                processor.run(files, operation, shutdown_signal).await
            }
        };

        if let Some(report) = &self.report {
            summary.write_report(report)?;
        }
        let certificate = match &self.certificate {
            Some(path) if !dry_run => {
                let mode = if self.in_place {
                    OutputMode::InPlace
                } else {
                    OutputMode::Copy
                };
                ComplianceCertificate::from_summary(&summary, mode, timestamps_reset).write(path)?;
                Some(path)
            }
            Some(_) => {
                tracing::warn!("Dry run, no compliance certificate written");
                None
            }
            None => None,
        };
        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&summary, dry_run);
            if let Some(path) = certificate {
                println!("  📜 Compliance certificate: {}", path.display());
            }
        }
        Ok(batch_exit_code(&summary))
    }

    /// Output file path when a single file is written under a chosen name
    fn single_destination(&self, files: &[PathBuf]) -> Option<PathBuf> {
        let output = self.output.as_ref()?;
        let [input] = self.paths.as_slice() else {
            return None;
        };
        if files.len() != 1 || !input.is_file() || !names_file(output) {
            return None;
        }
        Some(output.clone())
    }
}

/// `out.svs` names a file, `out/` or an existing directory does not
fn names_file(output: &Path) -> bool {
    !output.is_dir() && output.extension().is_some()
}

fn print_summary(summary: &BatchSummary, dry_run: bool) {
    let verb = if dry_run { "Planned" } else { "Anonymized" };
    println!("🧹 {} file(s) processed", summary.total_files);
    for file in &summary.files {
        let target = file
            .output
            .as_ref()
            .map(|o| format!(" -> {}", o.display()))
            .unwrap_or_default();
        println!(
            "  {:?} {}{target} ({} redaction(s), {} external)",
            file.status,
            file.path.display(),
            file.actions_applied,
            file.external
        );
    }
    println!();
    if dry_run {
        println!("  {verb}: {}", summary.phi_found);
    } else {
        println!("  {verb}: {}", summary.anonymized);
    }
    println!("  Already clean: {}", summary.already_clean);
    println!("  Errors: {}", summary.errored);
    if summary.skipped > 0 {
        println!("  Skipped: {}", summary.skipped);
    }
    for failure in &summary.failures {
        println!("  ❌ {failure}");
    }
    println!("  Run ID: {}", summary.run_id);
}
