// Slidescrub - Whole-slide image PHI anonymizer
// Copyright (c) 2025 Slidescrub Contributors
// Licensed under the MIT License

//! # Slidescrub - Whole-slide image PHI anonymizer
//!
//! Slidescrub finds and removes protected health information from digital
//! pathology slide files (Aperio SVS, Hamamatsu NDPI, generic TIFF,
//! 3DHISTECH MRXS and DICOM WSI) without touching diagnostic pixel data.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Scan, anonymize, verify and batch orchestration
//! - [`formats`] - One handler per slide format
//! - [`container`] - TIFF/BigTIFF directory reader and byte patcher
//! - [`detector`] - PHI pattern library and scanner
//! - [`domain`] - Findings, redactions, mutation plans and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slidescrub::core::{self, AnonymizeMode};
//!
//! # fn example() -> slidescrub::domain::Result<()> {
//! let scan = core::scan("case.svs");
//! for finding in &scan.findings {
//!     println!("{}: {}", finding.label, finding.preview);
//! }
//!
//! // redact a copy, leaving the original untouched
//! let record = core::anonymize("case.svs", AnonymizeMode::Copy("clean/case.svs".into()))?;
//! println!("{} redactions applied", record.actions_applied);
//! # Ok(())
//! # }
//! ```
//!
//! ## Batch Processing
//!
//! ```rust,no_run
//! use slidescrub::core::{BatchOperation, BatchProcessor, Scrubber};
//! use tokio::sync::watch;
//!
//! # async fn example(files: Vec<std::path::PathBuf>) -> slidescrub::domain::Result<()> {
//! let (_tx, shutdown) = watch::channel(false);
//! let processor = BatchProcessor::new(Scrubber::new()?, 8);
//! let summary = processor
//!     .run(files, BatchOperation::Anonymize { output_dir: Some("clean".into()) }, shutdown)
//!     .await;
//! println!("{} anonymized, {} failed", summary.anonymized, summary.errored);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Library operations return [`domain::ScrubError`]; the CLI wraps them in
//! `anyhow` and maps outcomes to exit codes.

pub mod cli;
pub mod config;
pub mod container;
pub mod core;
pub mod detector;
pub mod domain;
pub mod formats;
pub mod logging;
