//! Validate config command implementation
//!
//! This module implements the `validate-config` command for checking a
//! configuration file without touching any slide.

use crate::config::load_config;
use crate::detector::PatternRegistry;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as part of loading
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let rules = match &config.scan.pattern_library {
            Some(library) => match PatternRegistry::with_user_library(library) {
                Ok(registry) => registry.len(),
                Err(e) => {
                    println!("❌ Pattern library is invalid");
                    println!("   Error: {e}");
                    return Ok(2);
                }
            },
            None => PatternRegistry::default_patterns()?.len(),
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Sweep Window: {} bytes", config.scan.sweep_window_bytes);
        println!("  Scan Filenames: {}", config.scan.scan_filenames);
        println!("  Pattern Rules: {rules}");
        println!("  Verify: {}", config.anonymize.verify);
        println!("  Verify Integrity: {}", config.anonymize.verify_integrity);
        println!("  Reset Timestamps: {}", config.anonymize.reset_timestamps);
        println!("  Unlink Auxiliary: {}", config.anonymize.unlink_auxiliary);
        println!(
            "  UID Salt: {}",
            if config.anonymize.uid_salt.is_some() {
                "set"
            } else {
                "not set"
            }
        );
        println!("  Workers: {}", config.batch.workers);
        println!("  Recursive: {}", config.batch.recursive);
        if !config.batch.formats.is_empty() {
            println!("  Formats: {}", config.batch.formats.join(", "));
        }
        if config.audit.enabled {
            println!("  Audit Log: {}", config.audit.log_path.display());
        }
        println!();
        Ok(0)
    }
}
