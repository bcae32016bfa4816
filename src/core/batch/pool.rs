//! Bounded worker pool
//!
//! One file, one worker. Each file runs on the blocking pool behind a
//! semaphore permit, so at most `workers` files are open at a time.
//! Cancellation is cooperative: in-flight files finish, queued files are
//! recorded as skipped.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use super::summary::BatchSummary;
use crate::core::anonymize::AnonymizeMode;
use crate::core::audit::AuditLogger;
use crate::core::scrubber::Scrubber;
use crate::domain::{FileFailure, Stage};
use crate::{log_error_with_context, log_file_complete, log_file_start};

/// Operation applied to every file of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Report findings only
    Scan,
    /// Redact in place, or into `output_dir` when given
    Anonymize { output_dir: Option<PathBuf> },
}

impl BatchOperation {
    pub fn name(&self) -> &'static str {
        match self {
            BatchOperation::Scan => "scan",
            BatchOperation::Anonymize { .. } => "anonymize",
        }
    }

    fn stage(&self) -> Stage {
        match self {
            BatchOperation::Scan => Stage::Scan,
            BatchOperation::Anonymize { .. } => Stage::Anonymize,
        }
    }
}

/// Runs a [`BatchOperation`] over many files
pub struct BatchProcessor {
    scrubber: Arc<Scrubber>,
    workers: usize,
    run_id: Uuid,
    input_root: Option<PathBuf>,
    audit: Option<Arc<AuditLogger>>,
}

impl BatchProcessor {
    pub fn new(scrubber: Scrubber, workers: usize) -> Self {
        Self {
            scrubber: Arc::new(scrubber),
            workers: workers.max(1),
            run_id: Uuid::new_v4(),
            input_root: None,
            audit: None,
        }
    }

    /// Directory the inputs were discovered under; copies keep their
    /// relative layout below the output directory
    pub fn with_input_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.input_root = Some(root.into());
        self
    }

    /// Write one audit entry per anonymized file; the run id is taken
    /// from the logger
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.run_id = audit.run_id();
        self.audit = Some(Arc::new(audit));
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Process every file and return the aggregated summary
    pub async fn run(
        &self,
        files: Vec<PathBuf>,
        operation: BatchOperation,
        mut shutdown: watch::Receiver<bool>,
    ) -> BatchSummary {
        let start = Instant::now();
        let summary = Arc::new(Mutex::new(BatchSummary::new(self.run_id, operation.name())));
        let semaphore = Arc::new(Semaphore::new(self.workers));

        tracing::info!(
            run_id = %self.run_id,
            operation = operation.name(),
            files = files.len(),
            workers = self.workers,
            "Starting batch"
        );

        let mut handles = Vec::with_capacity(files.len());
        let mut queue = files.into_iter();
        while let Some(file) = queue.next() {
            let Some(permit) = acquire(&semaphore, &mut shutdown).await else {
                tracing::warn!("Shutdown requested, remaining files are skipped");
                let mut guard = lock(&summary);
                guard.record_skipped(file);
                for rest in queue.by_ref() {
                    guard.record_skipped(rest);
                }
                break;
            };

            let job = Job {
                scrubber: self.scrubber.clone(),
                audit: self.audit.clone(),
                summary: summary.clone(),
                destination: self.destination_for(&file, &operation),
                operation: operation.clone(),
                path: file.clone(),
            };
            let handle = tokio::task::spawn_blocking(move || {
                let _permit: OwnedSemaphorePermit = permit;
                job.process();
            });
            handles.push((file, handle));
        }

        for (file, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(path = %file.display(), error = %e, "Worker task failed");
                lock(&summary).record_failure(
                    FileFailure::message(&file, operation.stage(), format!("worker failed: {e}")),
                    None,
                );
            }
        }

        let mut summary = lock(&summary).clone().with_duration(start.elapsed());
        summary.sort();
        summary.log_summary();
        summary
    }

    /// Anonymize one file into an explicit destination path
    pub async fn anonymize_to(&self, source: PathBuf, destination: PathBuf) -> BatchSummary {
        let start = Instant::now();
        let summary = Arc::new(Mutex::new(BatchSummary::new(self.run_id, "anonymize")));
        let job = Job {
            scrubber: self.scrubber.clone(),
            audit: self.audit.clone(),
            summary: summary.clone(),
            destination: Some(destination),
            operation: BatchOperation::Anonymize { output_dir: None },
            path: source.clone(),
        };
        if let Err(e) = tokio::task::spawn_blocking(move || job.process()).await {
            tracing::error!(path = %source.display(), error = %e, "Worker task failed");
            lock(&summary).record_failure(
                FileFailure::message(&source, Stage::Anonymize, format!("worker failed: {e}")),
                None,
            );
        }
        let summary = lock(&summary).clone().with_duration(start.elapsed());
        summary.log_summary();
        summary
    }

    /// Output path in copy mode
    fn destination_for(&self, file: &Path, operation: &BatchOperation) -> Option<PathBuf> {
        let BatchOperation::Anonymize {
            output_dir: Some(output_dir),
        } = operation
        else {
            return None;
        };
        let relative = self
            .input_root
            .as_deref()
            .and_then(|root| file.strip_prefix(root).ok())
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .or_else(|| file.file_name().map(PathBuf::from))?;
        Some(output_dir.join(relative))
    }
}

/// Wait for a worker slot unless shutdown is requested first
async fn acquire(
    semaphore: &Arc<Semaphore>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<OwnedSemaphorePermit> {
    loop {
        if *shutdown.borrow() {
            return None;
        }
        tokio::select! {
            permit = semaphore.clone().acquire_owned() => return permit.ok(),
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // sender dropped: shutdown can no longer be requested
                    return semaphore.clone().acquire_owned().await.ok();
                }
            }
        }
    }
}

fn lock(summary: &Mutex<BatchSummary>) -> std::sync::MutexGuard<'_, BatchSummary> {
    summary.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Work for one file, run on the blocking pool
struct Job {
    scrubber: Arc<Scrubber>,
    audit: Option<Arc<AuditLogger>>,
    summary: Arc<Mutex<BatchSummary>>,
    destination: Option<PathBuf>,
    operation: BatchOperation,
    path: PathBuf,
}

impl Job {
    fn process(self) {
        let start = Instant::now();
        let path = self.path.as_path();
        log_file_start!(path.display(), self.operation.name());

        match &self.operation {
            BatchOperation::Scan => {
                let scan = self.scrubber.scan(path);
                let failure = scan.error.as_ref().map(|reason| {
                    let mut failure = FileFailure::message(path, Stage::Scan, reason.clone());
                    if let Some(kind) = &scan.error_kind {
                        failure.kind = kind.clone();
                    }
                    failure
                });
                log_file_complete!(path.display(), scan.findings.len(), start.elapsed());
                lock(&self.summary).record_scan(&scan, failure);
            }
            BatchOperation::Anonymize { .. } => {
                let mode = match &self.destination {
                    Some(dest) => AnonymizeMode::Copy(dest.clone()),
                    None => AnonymizeMode::InPlace,
                };
                match self.scrubber.anonymize_staged(path, &mode) {
                    Ok(record) => {
                        if let Some(audit) = &self.audit {
                            if let Err(e) = audit.log_record(&record) {
                                log_error_with_context!(e, "Failed to write audit entry");
                            }
                        }
                        lock(&self.summary).record_anonymized(&record);
                    }
                    Err(err) => {
                        log_error_with_context!(err, path.display().to_string());
                        let format = err
                            .partial
                            .as_ref()
                            .map(|r| r.format)
                            .or_else(|| self.scrubber.detect_format(path));
                        let failure = FileFailure::new(path, err.stage, &err.source);
                        if let Some(audit) = &self.audit {
                            if let Err(e) = audit.log_failure(&failure, format) {
                                log_error_with_context!(e, "Failed to write audit entry");
                            }
                        }
                        lock(&self.summary).record_failure(failure, format);
                    }
                }
            }
        }
    }
}
