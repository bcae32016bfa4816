//! Batch processing of many slides
//!
//! - [`certificate`] turns an anonymize summary into a compliance certificate
//! - [`discovery`] finds supported files under a directory
//! - [`pool`] runs one operation per file on a bounded worker pool
//! - [`summary`] aggregates counters and per-file outcomes into a report

pub mod certificate;
pub mod discovery;
pub mod pool;
pub mod summary;

pub use certificate::ComplianceCertificate;
pub use discovery::discover_files;
pub use pool::{BatchOperation, BatchProcessor};
pub use summary::{BatchSummary, FileReport, FileStatus};
