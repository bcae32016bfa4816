//! Domain models and types for slidescrub.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Findings** ([`PhiFinding`], [`Location`], [`ScanResult`])
//! - **Redactions** ([`Redaction`], [`MutationPlan`], [`MutationRecord`])
//! - **Error types** ([`ScrubError`], [`ParseError`], [`FileFailure`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, ScrubError>`]:
//!
//! ```rust
//! use slidescrub::domain::{ParseError, Result};
//!
//! fn example() -> Result<()> {
//!     // Parse errors convert with the ? operator
//!     Err(ParseError::Cycle(8))?
//! }
//! assert!(example().is_err());
//! ```

pub mod errors;
pub mod finding;
pub mod mutation;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::{FileFailure, ParseError, ScrubError, Stage};
pub use finding::{
    mask_preview, ByteRange, ElementOp, FieldBlock, FindingAction, FormatInfo, FormatKind,
    Location, PhiCategory, PhiFinding, Redaction, RedactionPolicy, ScanResult, Target,
};
pub use mutation::{MutationPlan, MutationRecord, OutputMode};
pub use result::Result;
