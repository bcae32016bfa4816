//! Audit trail for anonymization runs
//!
//! One line per processed file. Entries carry SHA-256 digests of the
//! redacted values, never the values themselves.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::domain::{
    FileFailure, FormatKind, MutationRecord, OutputMode, PhiCategory, RedactionPolicy, Stage,
};

/// Audit log entry
#[derive(Debug, Serialize)]
struct AuditEntry {
    run_id: Uuid,
    timestamp: DateTime<Utc>,
    source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<FormatKind>,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<OutputMode>,
    actions_applied: usize,
    counts: BTreeMap<PhiCategory, usize>,
    redactions: Vec<AuditRedaction>,
    external: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    integrity_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration_ms: u64,
}

/// One cleared finding (with hashed value)
#[derive(Debug, Serialize)]
struct AuditRedaction {
    category: PhiCategory,
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<RedactionPolicy>,
    /// SHA-256 of the original value
    #[serde(skip_serializing_if = "Option::is_none")]
    value_hash: Option<String>,
}

/// Appends audit entries to a JSONL (or plain text) file
///
/// Safe to share between batch workers; writes are serialized.
pub struct AuditLogger {
    log_path: PathBuf,
    json_format: bool,
    run_id: Uuid,
    write_lock: Mutex<()>,
}

impl AuditLogger {
    /// Create a new audit logger for one run
    pub fn new(log_path: PathBuf, json_format: bool, run_id: Uuid) -> Result<Self> {
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create audit log directory: {}", parent.display())
            })?;
        }

        Ok(Self {
            log_path,
            json_format,
            run_id,
            write_lock: Mutex::new(()),
        })
    }

    /// Logger for the configured audit file, or None when auditing is off
    pub fn from_config(config: &AuditConfig, run_id: Uuid) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        Self::new(config.log_path.clone(), config.json_format, run_id).map(Some)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a completed (or dry-run, or already clean) anonymization
    pub fn log_record(&self, record: &MutationRecord) -> Result<()> {
        let outcome = if record.dry_run {
            "dry_run"
        } else if record.already_clean {
            "already_clean"
        } else {
            "anonymized"
        };

        let mut counts = BTreeMap::new();
        for finding in &record.cleared {
            *counts.entry(finding.category).or_insert(0) += 1;
        }

        let entry = AuditEntry {
            run_id: self.run_id,
            timestamp: Utc::now(),
            source: record.source.clone(),
            output: (record.mode == OutputMode::Copy && !record.already_clean && !record.dry_run)
                .then(|| record.output.clone()),
            format: Some(record.format),
            outcome,
            mode: Some(record.mode),
            actions_applied: record.actions_applied,
            counts,
            redactions: record
                .cleared
                .iter()
                .map(|f| AuditRedaction {
                    category: f.category,
                    label: f.label.clone(),
                    policy: f.redaction().map(|r| r.policy()),
                    value_hash: f.value_digest.clone(),
                })
                .collect(),
            external: record.external.len(),
            verified: record.verified,
            integrity_verified: record.integrity_verified,
            stage: None,
            error: None,
            duration_ms: record.duration_ms,
        };

        self.write_entry(&entry)
    }

    /// Log a file that failed
    pub fn log_failure(&self, failure: &FileFailure, format: Option<FormatKind>) -> Result<()> {
        let entry = AuditEntry {
            run_id: self.run_id,
            timestamp: Utc::now(),
            source: failure.path.clone(),
            output: None,
            format,
            outcome: "failed",
            mode: None,
            actions_applied: 0,
            counts: BTreeMap::new(),
            redactions: Vec::new(),
            external: 0,
            verified: None,
            integrity_verified: None,
            stage: Some(failure.stage),
            error: Some(failure.reason.clone()),
            duration_ms: 0,
        };
        self.write_entry(&entry)
    }

    /// Write an audit entry to the log file
    fn write_entry(&self, entry: &AuditEntry) -> Result<()> {
        let line = if self.json_format {
            serde_json::to_string(entry).context("Failed to serialize audit entry")?
        } else {
            format!(
                "[{}] run={} file={} outcome={} actions={} findings={} time={}ms",
                entry.timestamp.to_rfc3339(),
                entry.run_id,
                entry.source.display(),
                entry.outcome,
                entry.actions_applied,
                entry.redactions.len(),
                entry.duration_ms
            )
        };

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open audit log: {}", self.log_path.display()))?;
        writeln!(file, "{line}").context("Failed to write audit entry")?;
        Ok(())
    }
}
