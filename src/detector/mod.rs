//! PHI pattern detection
//!
//! Vendor-agnostic detection of identifier-shaped text: accession and case
//! numbers, record numbers, national IDs, birth dates and generic dates.
//! Rules come from an embedded TOML library that users can extend.

pub mod patterns;
pub mod scanner;

pub use patterns::{CharClass, CompiledPattern, PatternDefinition, PatternRegistry};
pub use scanner::{is_date_anonymized, PatternMatch, PatternScanner, MAX_EXTENSION, SWEEP_WINDOW};
