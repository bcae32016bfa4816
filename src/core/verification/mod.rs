//! Post-anonymization verification
//!
//! This module proves two things about an output file: nothing redactable
//! is left (a full re-scan) and the diagnostic image data is unchanged
//! (SHA-256 fingerprints of every diagnostic region).

pub mod fingerprint;
pub mod report;
pub mod verify;

pub use fingerprint::Fingerprint;
pub use report::{VerificationFailure, VerificationReport};
pub use verify::VerificationOutcome;
