//! Plan application
//!
//! Redactions never change a field's footprint, so applying a plan to an
//! already anonymized file finds an empty plan and writes nothing. That is
//! what makes a second pass byte identical.

use std::borrow::Cow;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Instant;

use filetime::FileTime;
use thiserror::Error;

use super::copy::{self, CopiedSlide};
use crate::core::scrubber::Scrubber;
use crate::core::verification::Fingerprint;
use crate::domain::{
    MutationPlan, MutationRecord, OutputMode, Redaction, ScrubError, Stage, Target,
};
use crate::formats::FormatHandler;
use crate::{log_file_complete, log_file_start};

/// Where the redacted output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnonymizeMode {
    /// Copy the source to this path first and mutate the copy
    Copy(PathBuf),
    /// Mutate the source file
    InPlace,
}

/// An anonymization failure and the stage it happened at
///
/// In-place runs that stop part way carry the partial record: which
/// findings were cleared and which actions are still pending.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct AnonymizeError {
    pub stage: Stage,
    #[source]
    pub source: ScrubError,
    pub partial: Option<Box<MutationRecord>>,
}

impl AnonymizeError {
    pub fn new(stage: Stage, source: ScrubError) -> Self {
        Self {
            stage,
            source,
            partial: None,
        }
    }

    fn with_partial(mut self, record: MutationRecord) -> Self {
        self.partial = Some(Box::new(record));
        self
    }
}

impl From<AnonymizeError> for ScrubError {
    fn from(err: AnonymizeError) -> Self {
        err.source
    }
}

/// Applies plans produced by a [`Scrubber`]
pub struct Anonymizer<'a> {
    scrubber: &'a Scrubber,
}

impl<'a> Anonymizer<'a> {
    pub fn new(scrubber: &'a Scrubber) -> Self {
        Self { scrubber }
    }

    /// Apply `plan` to `path`
    ///
    /// # Errors
    ///
    /// Returns the failing stage. In copy mode the destination (and any
    /// copied companion directory) has been removed by then.
    pub fn apply(
        &self,
        path: &Path,
        plan: &MutationPlan,
        mode: &AnonymizeMode,
    ) -> Result<MutationRecord, AnonymizeError> {
        let start = Instant::now();
        let settings = self.scrubber.settings();
        log_file_start!(path.display(), "anonymize");

        let handler = self
            .scrubber
            .registry()
            .handler(plan.format)
            .ok_or_else(|| {
                AnonymizeError::new(
                    Stage::Detect,
                    ScrubError::UnsupportedFormat(plan.format.to_string()),
                )
            })?;

        let (output, output_mode) = match mode {
            AnonymizeMode::Copy(dest) => (dest.clone(), OutputMode::Copy),
            AnonymizeMode::InPlace => (path.to_path_buf(), OutputMode::InPlace),
        };
        let mut record = MutationRecord::new(path, &output, output_mode, plan.format);
        record.external = plan.external.clone();

        if plan.is_empty() {
            record.already_clean = true;
            record.duration_ms = start.elapsed().as_millis() as u64;
            tracing::info!(
                path = %path.display(),
                external = plan.external.len(),
                "Already clean, nothing written"
            );
            return Ok(record);
        }

        if settings.dry_run {
            record.dry_run = true;
            record.pending = plan.actions.iter().map(describe).collect();
            record.duration_ms = start.elapsed().as_millis() as u64;
            tracing::info!(
                path = %path.display(),
                actions = plan.len(),
                "Dry run, redactions planned but not applied"
            );
            return Ok(record);
        }

        let before = if settings.verify_integrity {
            Some(
                fingerprint(handler.as_ref(), path)
                    .map_err(|e| AnonymizeError::new(Stage::Integrity, e))?,
            )
        } else {
            None
        };

        let copied = match mode {
            AnonymizeMode::Copy(dest) => Some(
                copy::copy_slide(path, dest, handler.companion_dir(path).as_deref())
                    .map_err(|e| AnonymizeError::new(Stage::Copy, e))?,
            ),
            AnonymizeMode::InPlace => None,
        };

        let result = self.mutate(handler.as_ref(), plan, mode, &output, before, record);
        let mut record = match result {
            Ok(record) => record,
            Err(err) => {
                if let Some(copied) = &copied {
                    copied.remove();
                }
                return Err(err);
            }
        };

        record.duration_ms = start.elapsed().as_millis() as u64;
        log_file_complete!(
            path.display(),
            record.findings_cleared(),
            start.elapsed()
        );
        Ok(record)
    }

    /// Redact, then run the integrity, timestamp and verification steps
    fn mutate(
        &self,
        handler: &dyn FormatHandler,
        plan: &MutationPlan,
        mode: &AnonymizeMode,
        output: &Path,
        before: Option<Fingerprint>,
        mut record: MutationRecord,
    ) -> Result<MutationRecord, AnonymizeError> {
        let settings = self.scrubber.settings();
        let target_plan = match mode {
            AnonymizeMode::Copy(dest) => Cow::Owned(rebase_plan(plan, &plan.path, dest)),
            AnonymizeMode::InPlace => Cow::Borrowed(plan),
        };

        let outcome = handler.redact(output, &target_plan, self.scrubber.redact_options());
        let applied = outcome.applied.min(plan.actions.len());
        record.actions_applied = applied;
        record.bytes_written = outcome.bytes_written;

        if let Some(error) = outcome.error {
            let done: HashSet<String> = plan.actions[..applied]
                .iter()
                .map(Redaction::dedup_key)
                .collect();
            record.cleared = plan
                .findings
                .iter()
                .filter(|f| f.redaction().is_some_and(|r| done.contains(&r.dedup_key())))
                .cloned()
                .collect();
            record.pending = plan.actions[applied..].iter().map(describe).collect();
            tracing::error!(
                path = %output.display(),
                applied,
                pending = record.pending.len(),
                error = %error,
                "Anonymization stopped part way"
            );
            let err = AnonymizeError::new(Stage::Anonymize, error);
            return Err(match mode {
                AnonymizeMode::InPlace => err.with_partial(record),
                AnonymizeMode::Copy(_) => err,
            });
        }
        record.cleared = plan.findings.clone();

        if let Some(before) = before {
            let after = fingerprint(handler, output)
                .map_err(|e| AnonymizeError::new(Stage::Integrity, e))?;
            let changed = before.mismatches(&after);
            if !changed.is_empty() {
                record.integrity_verified = Some(false);
                let err = AnonymizeError::new(
                    Stage::Integrity,
                    ScrubError::IntegrityMismatch(format!(
                        "diagnostic regions changed: {}",
                        changed.join(", ")
                    )),
                );
                return Err(err.with_partial(record));
            }
            record.integrity_verified = Some(true);
        }

        if settings.reset_timestamps {
            filetime::set_file_times(output, FileTime::zero(), FileTime::zero())
                .map_err(|e| AnonymizeError::new(Stage::Anonymize, e.into()))?;
        }

        if settings.verify {
            let outcome = self
                .scrubber
                .scan_with(handler, output)
                .map(crate::core::verification::VerificationOutcome::from_scan)
                .map_err(|e| AnonymizeError::new(Stage::Verify, e))?;
            record.verified = Some(outcome.clean);
            if !outcome.clean {
                let err = AnonymizeError::new(
                    Stage::Verify,
                    ScrubError::Redaction(format!(
                        "{} finding(s) remain after anonymization",
                        outcome.findings.len()
                    )),
                );
                return Err(err.with_partial(record));
            }
        }

        tracing::info!(
            path = %output.display(),
            actions = record.actions_applied,
            bytes_written = record.bytes_written,
            "Redactions applied"
        );
        Ok(record)
    }
}

fn fingerprint(handler: &dyn FormatHandler, path: &Path) -> crate::domain::Result<Fingerprint> {
    Ok(Fingerprint::new(
        path,
        handler.kind(),
        handler.diagnostic_digests(path)?,
    ))
}

/// Human description of a redaction, used for pending and dry-run lists
fn describe(redaction: &Redaction) -> String {
    let policy = redaction.policy();
    match redaction {
        Redaction::Overwrite {
            target,
            offset,
            bytes,
            ..
        } => format!(
            "{policy:?} {} bytes at {}@{offset}",
            bytes.len(),
            target_name(target)
        ),
        Redaction::ZeroFill {
            target,
            offset,
            length,
        } => format!("{policy:?} {length} bytes at {}@{offset}", target_name(target)),
        Redaction::BlankImage {
            directory_offset,
            regions,
        } => format!(
            "{policy:?} {} region(s) of directory @{directory_offset}",
            regions.len()
        ),
        Redaction::Element { path, .. } => format!("{policy:?} {path}"),
    }
}

fn target_name(target: &Target) -> String {
    match target {
        Target::Primary => "primary".to_string(),
        Target::Companion(path) => path.display().to_string(),
    }
}

/// Point companion targets at the destination's companion directory
///
/// Companion paths are relative to the slide's parent and start with the
/// slide's stem, which changes when the copy is renamed.
fn rebase_plan(plan: &MutationPlan, source: &Path, dest: &Path) -> MutationPlan {
    let mut rebased = plan.clone();
    rebased.path = dest.to_path_buf();
    let (Some(from), Some(to)) = (source.file_stem(), dest.file_stem()) else {
        return rebased;
    };
    if from != to {
        for action in &mut rebased.actions {
            rebase_target(action, from, to);
        }
    }
    rebased
}

fn rebase_target(action: &mut Redaction, from: &OsStr, to: &OsStr) {
    let target = match action {
        Redaction::Overwrite { target, .. } | Redaction::ZeroFill { target, .. } => target,
        _ => return,
    };
    if let Target::Companion(relative) = target {
        if let Ok(rest) = relative.strip_prefix(from) {
            *relative = Path::new(to).join(rest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::testutil::{build, TestField};
    use crate::core::scrubber::ScrubSettings;
    use crate::domain::RedactionPolicy;

    fn write(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn dirty_tiff() -> Vec<u8> {
        build(vec![vec![
            TestField::ascii(285, "AS-24-123456"),
            TestField::long(256, &[512]),
        ]])
    }

    #[test]
    fn test_in_place_then_second_pass_is_already_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "slide.tif", &dirty_tiff());
        let scrubber = Scrubber::new().unwrap();

        let first = scrubber.anonymize(&path, AnonymizeMode::InPlace).unwrap();
        assert_eq!(first.actions_applied, 1);
        assert_eq!(first.findings_cleared(), 1);
        assert_eq!(first.verified, Some(true));
        assert_eq!(first.integrity_verified, Some(true));
        let once = std::fs::read(&path).unwrap();
        assert_eq!(once.len(), dirty_tiff().len());

        let second = scrubber.anonymize(&path, AnonymizeMode::InPlace).unwrap();
        assert!(second.already_clean);
        assert_eq!(second.findings_cleared(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), once);
    }

    #[test]
    fn test_copy_mode_leaves_source_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(&dir, "slide.tif", &dirty_tiff());
        let dest = dir.path().join("out/slide.tif");
        let scrubber = Scrubber::new().unwrap();

        let record = scrubber
            .anonymize(&source, AnonymizeMode::Copy(dest.clone()))
            .unwrap();
        assert_eq!(record.mode, OutputMode::Copy);
        assert_eq!(record.output, dest);
        assert_eq!(std::fs::read(&source).unwrap(), dirty_tiff());
        assert!(scrubber.verify(&dest).unwrap().clean);
        assert!(!scrubber.verify(&source).unwrap().clean);
    }

    #[test]
    fn test_clean_file_is_never_copied() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(&dir, "clean.tif", &build(vec![vec![TestField::long(256, &[8])]]));
        let dest = dir.path().join("out/clean.tif");

        let record = Scrubber::new()
            .unwrap()
            .anonymize(&source, AnonymizeMode::Copy(dest.clone()))
            .unwrap();
        assert!(record.already_clean);
        assert!(!dest.exists());
    }

    #[test]
    fn test_dry_run_lists_pending_actions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "slide.tif", &dirty_tiff());
        let scrubber = Scrubber::new().unwrap().with_settings(ScrubSettings {
            dry_run: true,
            ..ScrubSettings::default()
        });

        let record = scrubber.anonymize(&path, AnonymizeMode::InPlace).unwrap();
        assert!(record.dry_run);
        assert_eq!(record.actions_applied, 0);
        assert_eq!(record.pending.len(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), dirty_tiff());
    }

    #[test]
    fn test_reset_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "slide.tif", &dirty_tiff());
        let scrubber = Scrubber::new().unwrap().with_settings(ScrubSettings {
            reset_timestamps: true,
            ..ScrubSettings::default()
        });
        scrubber.anonymize(&path, AnonymizeMode::InPlace).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), FileTime::zero());
    }

    #[test]
    fn test_copy_failure_removes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(&dir, "slide.tif", &dirty_tiff());
        let scrubber = Scrubber::new().unwrap();
        let mut plan = scrubber.plan(&source).unwrap();
        // an action the container cannot satisfy
        plan.actions.push(Redaction::Overwrite {
            target: Target::Companion(PathBuf::from("slide/missing.dat")),
            offset: 0,
            bytes: vec![0; 4],
            policy: RedactionPolicy::ZeroFill,
        });

        let dest = dir.path().join("out/slide.tif");
        let err = Anonymizer::new(&scrubber)
            .apply(&source, &plan, &AnonymizeMode::Copy(dest.clone()))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Anonymize);
        assert!(err.partial.is_none());
        assert!(!dest.exists());
        assert_eq!(std::fs::read(&source).unwrap(), dirty_tiff());
    }

    #[test]
    fn test_in_place_failure_reports_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "slide.tif", &dirty_tiff());
        let scrubber = Scrubber::new().unwrap();
        let mut plan = scrubber.plan(&path).unwrap();
        plan.actions.push(Redaction::ZeroFill {
            target: Target::Companion(PathBuf::from("slide/missing.dat")),
            offset: 0,
            length: 4,
        });

        let err = Anonymizer::new(&scrubber)
            .apply(&path, &plan, &AnonymizeMode::InPlace)
            .unwrap_err();
        let partial = err.partial.unwrap();
        assert_eq!(partial.actions_applied, 1);
        assert_eq!(partial.findings_cleared(), 1);
        assert_eq!(partial.pending.len(), 1);
        assert!(matches!(err.source, ScrubError::CompanionMissing(_)));
    }

    #[test]
    fn test_rebase_companion_targets() {
        let plan = MutationPlan {
            path: PathBuf::from("in/case.mrxs"),
            format: crate::domain::FormatKind::Mrxs,
            findings: Vec::new(),
            actions: vec![Redaction::ZeroFill {
                target: Target::Companion(PathBuf::from("case/Data0001.dat")),
                offset: 10,
                length: 4,
            }],
            external: Vec::new(),
        };
        let rebased = rebase_plan(&plan, Path::new("in/case.mrxs"), Path::new("out/anon.mrxs"));
        assert_eq!(
            rebased.actions[0],
            Redaction::ZeroFill {
                target: Target::Companion(PathBuf::from("anon/Data0001.dat")),
                offset: 10,
                length: 4,
            }
        );
    }
}
