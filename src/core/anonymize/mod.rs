//! Mutation and idempotency engine
//!
//! - [`engine`] applies a [`MutationPlan`](crate::domain::MutationPlan) in
//!   place or to a fresh copy, with integrity and verification checks
//! - [`copy`] copies a slide together with its companion directory

pub mod copy;
pub mod engine;

pub use copy::{copy_slide, CopiedSlide};
pub use engine::{AnonymizeError, AnonymizeMode, Anonymizer};
