//! # Traitload - hierarchical trait data set ingestion
//!
//! Traitload loads a nested document of trait measurements into a relational
//! store. Groups declare defaults (site, species, citation, date, ...) that
//! flow down to their traits; every reference is resolved to an existing row
//! and the whole submission commits or rolls back as one transaction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ JSON document│────▶│  Validation  │────▶│  GroupWalker │────▶│   SQLite     │
//! │ (group tree) │     │  (schema)    │     │  (resolve)   │     │ (one tx)     │
//! └──────────────┘     └──────────────┘     └──────────────┘     └──────────────┘
//!                                                  │
//!                                                  ▼
//!                                       annotated document + ErrorSet
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use traitload::{connect, init_schema, submit, SubmitOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("sqlite://traitload.db?mode=rwc", 5).await?;
//!     init_schema(&pool).await?;
//!     let document = serde_json::from_str(&std::fs::read_to_string("data.json")?)?;
//!     let outcome = submit(&pool, document, SubmitOptions::new(1)).await?;
//!     println!("{:?}: {} traits", outcome.status, outcome.created_trait_ids.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Environment configuration
//! - [`models`] - Reference kinds, inherited context, rows
//! - [`document`] - Typed document tree, node paths, annotations
//! - [`validation`] - Document schema validation
//! - [`store`] - SQLite schema and queries
//! - [`resolve`] - References, entities, dates
//! - [`diagnostics`] - Per-submission error accumulation
//! - [`ingest`] - Walker, committer, transaction coordinator

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Document
pub mod document;
pub mod validation;

// Storage
pub mod store;

// Ingestion
pub mod diagnostics;
pub mod ingest;
pub mod resolve;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, DateError, Fatal, LookupError, ResolveError, StoreError, SubmitError,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::Config;

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{DefaultContext, ReferenceKind, ResolvedDate, Stat, TraitRow};

// =============================================================================
// Re-exports - Document
// =============================================================================

pub use document::{AnnotationKey, Annotations, GroupNode, NodePath, TraitNode};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    document_violations, is_valid, is_valid_document, validate, validate_document, violations,
    SchemaViolation, DOCUMENT_SCHEMA,
};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{connect, count_rows, init_schema};

// =============================================================================
// Re-exports - Ingestion
// =============================================================================

pub use ingest::{
    submit, Diagnostics, ErrorSet, NodeError, SubmissionOutcome, SubmissionStatus, SubmitOptions,
};
