//! Configuration schema types
//!
//! Every section is optional in the TOML file; missing sections and keys fall
//! back to the defaults below.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::SecretString;
use crate::detector::SWEEP_WINDOW;
use crate::domain::FormatKind;

/// Root configuration, mapped from `slidescrub.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrubConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Detection settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Redaction settings
    #[serde(default)]
    pub anonymize: AnonymizeConfig,

    /// Batch dispatcher settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Audit trail settings
    #[serde(default)]
    pub audit: AuditConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ScrubConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid key
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.scan.validate()?;
        self.batch.validate()?;
        self.audit.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Plan redactions without writing anything
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Bytes from the start of the file covered by the raw safety sweep
    #[serde(default = "default_sweep_window")]
    pub sweep_window_bytes: u64,

    /// Report identifiers found in file names
    #[serde(default = "default_true")]
    pub scan_filenames: bool,

    /// Extra pattern rules merged after the built-in library
    #[serde(default)]
    pub pattern_library: Option<PathBuf>,
}

impl ScanConfig {
    fn validate(&self) -> Result<(), String> {
        if self.sweep_window_bytes == 0 {
            return Err("scan.sweep_window_bytes must be > 0".to_string());
        }
        if self.sweep_window_bytes > MAX_SWEEP_WINDOW {
            return Err(format!(
                "scan.sweep_window_bytes must be <= {MAX_SWEEP_WINDOW}"
            ));
        }
        if let Some(library) = &self.pattern_library {
            if !library.is_file() {
                return Err(format!(
                    "scan.pattern_library {} does not exist",
                    library.display()
                ));
            }
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sweep_window_bytes: default_sweep_window(),
            scan_filenames: true,
            pattern_library: None,
        }
    }
}

/// Redaction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizeConfig {
    /// Re-scan the output after redaction
    #[serde(default = "default_true")]
    pub verify: bool,

    /// Compare diagnostic image fingerprints before and after
    #[serde(default = "default_true")]
    pub verify_integrity: bool,

    /// Set access and modification times of the output to the epoch
    #[serde(default)]
    pub reset_timestamps: bool,

    /// Remove blanked auxiliary directories from the TIFF chain
    #[serde(default = "default_true")]
    pub unlink_auxiliary: bool,

    /// Key for DICOM UID remapping
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub uid_salt: Option<SecretString>,
}

impl Default for AnonymizeConfig {
    fn default() -> Self {
        Self {
            verify: true,
            verify_integrity: true,
            reset_timestamps: false,
            unlink_auxiliary: true,
            uid_salt: None,
        }
    }
}

/// Batch dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Files processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Descend into sub-directories
    #[serde(default)]
    pub recursive: bool,

    /// Only process these formats (empty = all)
    #[serde(default)]
    pub formats: Vec<String>,
}

impl BatchConfig {
    fn validate(&self) -> Result<(), String> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(format!("batch.workers must be between 1 and {MAX_WORKERS}"));
        }
        for format in &self.formats {
            FormatKind::from_str(format)
                .map_err(|_| format!("batch.formats contains unknown format '{format}'"))?;
        }
        Ok(())
    }

    /// Parsed format filter
    pub fn format_filter(&self) -> Vec<FormatKind> {
        self.formats
            .iter()
            .filter_map(|f| FormatKind::from_str(f).ok())
            .collect()
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            recursive: false,
            formats: Vec::new(),
        }
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Write one audit entry per processed file
    #[serde(default)]
    pub enabled: bool,

    /// Audit log path
    #[serde(default = "default_audit_path")]
    pub log_path: PathBuf,

    /// JSON lines (true) or plain text lines (false)
    #[serde(default = "default_true")]
    pub json_format: bool,
}

impl AuditConfig {
    fn validate(&self) -> Result<(), String> {
        if self.enabled && self.log_path.as_os_str().is_empty() {
            return Err("audit.log_path must be set when audit is enabled".to_string());
        }
        Ok(())
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: default_audit_path(),
            json_format: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path must be set when file logging is enabled".to_string());
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

/// Largest accepted sweep window
pub const MAX_SWEEP_WINDOW: u64 = 64 * 1024 * 1024;

/// Largest accepted worker count
pub const MAX_WORKERS: usize = 256;

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sweep_window() -> u64 {
    SWEEP_WINDOW
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_WORKERS)
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("slidescrub-audit.jsonl")
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
