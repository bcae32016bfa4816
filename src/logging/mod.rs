//! Logging and observability
//!
//! Structured logging through `tracing`:
//! - human-readable console output on stderr (stdout carries reports)
//! - optional JSON log files with rotation
//!
//! Log events never carry raw identifier values. Findings are logged by
//! label, category and masked preview only.
//!
//! # Example
//!
//! ```no_run
//! use slidescrub::logging::init_logging;
//! use slidescrub::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(path = "slide.svs", "Scanning");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of work on one file
///
/// # Example
///
/// ```no_run
/// use slidescrub::log_file_start;
///
/// log_file_start!("slide.svs", "anonymize");
/// ```
#[macro_export]
macro_rules! log_file_start {
    ($path:expr, $operation:expr) => {
        tracing::debug!(
            path = %$path,
            operation = $operation,
            "Processing file"
        );
    };
}

/// Log the outcome of work on one file
///
/// # Example
///
/// ```no_run
/// use slidescrub::log_file_complete;
/// use std::time::Duration;
///
/// log_file_complete!("slide.svs", 3, Duration::from_millis(120));
/// ```
#[macro_export]
macro_rules! log_file_complete {
    ($path:expr, $findings:expr, $duration:expr) => {
        tracing::info!(
            path = %$path,
            findings = $findings,
            duration_ms = $duration.as_millis() as u64,
            "File processed"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use slidescrub::log_error_with_context;
/// use slidescrub::domain::ScrubError;
///
/// let error = ScrubError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
