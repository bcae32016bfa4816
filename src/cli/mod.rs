//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for slidescrub using clap.
//!
//! Exit codes: 0 success, 1 PHI found, 2 configuration error, 3 some files
//! failed, 5 fatal error.

pub mod commands;

use clap::{Parser, Subcommand};

/// Slidescrub - whole-slide image PHI anonymizer
#[derive(Parser, Debug)]
#[command(name = "slidescrub")]
#[command(version, about, long_about = None)]
#[command(author = "Slidescrub Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "slidescrub.toml", env = "SLIDESCRUB_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "SLIDESCRUB_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report PHI found in slide files
    Scan(commands::scan::ScanArgs),

    /// Remove PHI from slide files, in place or into an output location
    Anonymize(commands::anonymize::AnonymizeArgs),

    /// Re-scan files and confirm nothing redactable remains
    Verify(commands::verify::VerifyArgs),

    /// Show format details of one slide file
    Info(commands::info::InfoArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
