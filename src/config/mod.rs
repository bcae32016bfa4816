//! Configuration management for slidescrub.
//!
//! Settings come from a TOML file (`slidescrub.toml` by default) with
//! `${VAR}` substitution, `SLIDESCRUB_*` environment overrides and
//! validation on load. Every section is optional.
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [scan]
//! sweep_window_bytes = 1000000
//! scan_filenames = true
//!
//! [anonymize]
//! verify = true
//! verify_integrity = true
//! uid_salt = "${SLIDESCRUB_UID_SALT}"
//!
//! [batch]
//! workers = 4
//! recursive = true
//!
//! [audit]
//! enabled = true
//! log_path = "slidescrub-audit.jsonl"
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use slidescrub::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("slidescrub.toml")?;
//! println!("Workers: {}", config.batch.workers);
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, load_config_or_default};
pub use schema::{
    AnonymizeConfig, ApplicationConfig, AuditConfig, BatchConfig, LoggingConfig, ScanConfig,
    ScrubConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
