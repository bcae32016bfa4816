//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::ScrubConfig;
use super::secret_string;
use crate::domain::errors::ScrubError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into ScrubConfig
/// 4. Applies environment variable overrides (SLIDESCRUB_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`ScrubError::Configuration`] if the file cannot be read or parsed,
/// a referenced variable is unset, or validation fails
///
/// # Examples
///
/// ```no_run
/// use slidescrub::config::loader::load_config;
///
/// let config = load_config("slidescrub.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ScrubConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ScrubError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ScrubError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: ScrubConfig = toml::from_str(&contents)
        .map_err(|e| ScrubError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ScrubError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Loads the file when it exists, otherwise defaults plus environment
/// overrides
///
/// Lets single-file commands run without a configuration file.
pub fn load_config_or_default(path: impl AsRef<Path>) -> Result<ScrubConfig> {
    let path = path.as_ref();
    if path.exists() {
        return load_config(path);
    }
    tracing::debug!(path = %path.display(), "No configuration file, using defaults");
    let mut config = ScrubConfig::default();
    apply_env_overrides(&mut config)?;
    config.validate().map_err(|e| {
        ScrubError::Configuration(format!("Configuration validation failed: {e}"))
    })?;
    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ScrubError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        let trimmed = line.trim_start();

        // comments are copied verbatim
        if trimmed.starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{var_name}}}");
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(ScrubError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_flag(name: &str, current: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(current)
}

/// Applies environment variable overrides using SLIDESCRUB_* prefix
///
/// Environment variables follow the pattern: SLIDESCRUB_<SECTION>_<KEY>
/// For example: SLIDESCRUB_BATCH_WORKERS, SLIDESCRUB_ANONYMIZE_UID_SALT
fn apply_env_overrides(config: &mut ScrubConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("SLIDESCRUB_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    config.application.dry_run = env_flag("SLIDESCRUB_APPLICATION_DRY_RUN", config.application.dry_run);

    // Scan overrides
    if let Ok(val) = std::env::var("SLIDESCRUB_SCAN_SWEEP_WINDOW_BYTES") {
        config.scan.sweep_window_bytes = val.parse().map_err(|_| {
            ScrubError::Configuration(format!("SLIDESCRUB_SCAN_SWEEP_WINDOW_BYTES is not a number: {val}"))
        })?;
    }
    config.scan.scan_filenames = env_flag("SLIDESCRUB_SCAN_SCAN_FILENAMES", config.scan.scan_filenames);
    if let Ok(val) = std::env::var("SLIDESCRUB_SCAN_PATTERN_LIBRARY") {
        config.scan.pattern_library = Some(val.into());
    }

    // Anonymize overrides
    let anonymize = &mut config.anonymize;
    anonymize.verify = env_flag("SLIDESCRUB_ANONYMIZE_VERIFY", anonymize.verify);
    anonymize.verify_integrity =
        env_flag("SLIDESCRUB_ANONYMIZE_VERIFY_INTEGRITY", anonymize.verify_integrity);
    anonymize.reset_timestamps =
        env_flag("SLIDESCRUB_ANONYMIZE_RESET_TIMESTAMPS", anonymize.reset_timestamps);
    anonymize.unlink_auxiliary =
        env_flag("SLIDESCRUB_ANONYMIZE_UNLINK_AUXILIARY", anonymize.unlink_auxiliary);
    if let Ok(val) = std::env::var("SLIDESCRUB_ANONYMIZE_UID_SALT") {
        anonymize.uid_salt = Some(secret_string(val));
    }

    // Batch overrides
    if let Ok(val) = std::env::var("SLIDESCRUB_BATCH_WORKERS") {
        config.batch.workers = val.parse().map_err(|_| {
            ScrubError::Configuration(format!("SLIDESCRUB_BATCH_WORKERS is not a number: {val}"))
        })?;
    }
    config.batch.recursive = env_flag("SLIDESCRUB_BATCH_RECURSIVE", config.batch.recursive);

    // Audit overrides
    config.audit.enabled = env_flag("SLIDESCRUB_AUDIT_ENABLED", config.audit.enabled);
    if let Ok(val) = std::env::var("SLIDESCRUB_AUDIT_LOG_PATH") {
        config.audit.log_path = val.into();
    }

    // Logging overrides
    config.logging.local_enabled =
        env_flag("SLIDESCRUB_LOGGING_LOCAL_ENABLED", config.logging.local_enabled);
    if let Ok(val) = std::env::var("SLIDESCRUB_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("SLIDESCRUB_TEST_SALT", "abc123");
        let input = "uid_salt = \"${SLIDESCRUB_TEST_SALT}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "uid_salt = \"abc123\"\n");
        std::env::remove_var("SLIDESCRUB_TEST_SALT");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("SLIDESCRUB_MISSING_VAR");
        let input = "uid_salt = \"${SLIDESCRUB_MISSING_VAR}\"";
        assert!(substitute_env_vars(input).is_err());
    }

    #[test]
    fn test_comments_are_not_substituted() {
        std::env::remove_var("SLIDESCRUB_COMMENTED_VAR");
        let input = "# uid_salt = \"${SLIDESCRUB_COMMENTED_VAR}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.toml");
        assert!(matches!(result, Err(ScrubError::Configuration(_))));
    }

    #[test]
    fn test_load_config_or_default_without_file() {
        let config = load_config_or_default("definitely-not-here.toml").unwrap();
        assert_eq!(config.application.log_level, "info");
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[application]
log_level = "debug"

[scan]
sweep_window_bytes = 2048
scan_filenames = false

[anonymize]
verify_integrity = false
uid_salt = "0123456789abcdef"

[batch]
workers = 2
recursive = true
formats = ["svs", "ndpi"]

[audit]
enabled = true
log_path = "audit.jsonl"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.scan.sweep_window_bytes, 2048);
        assert!(!config.scan.scan_filenames);
        assert!(!config.anonymize.verify_integrity);
        assert_eq!(
            config
                .anonymize
                .uid_salt
                .as_ref()
                .map(|s| s.expose_secret().as_ref().to_string()),
            Some("0123456789abcdef".to_string())
        );
        assert_eq!(config.batch.workers, 2);
        assert!(config.batch.recursive);
        assert!(config.audit.enabled);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[logging]\nlocal_rotation = \"weekly\"\n")
            .unwrap();
        temp_file.flush().unwrap();
        assert!(matches!(
            load_config(temp_file.path()),
            Err(ScrubError::Configuration(_))
        ));
    }
}
