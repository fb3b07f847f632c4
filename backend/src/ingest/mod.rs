//! Ingestion of trait data set documents.
//!
//! - [`walker`] - depth-first traversal carrying the inherited context
//! - [`committer`] - row validation and insertion
//! - [`pipeline`] - one transaction per submission

pub mod committer;
pub mod pipeline;
pub mod walker;

pub use crate::diagnostics::{Diagnostics, ErrorSet, NodeError};
pub use committer::{commit_trait, validate_trait_row, CommitOutcome};
pub use pipeline::{submit, SubmissionOutcome, SubmissionStatus, SubmitOptions};
pub use walker::{GroupWalker, WalkReport};
