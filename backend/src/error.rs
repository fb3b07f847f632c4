//! Error types for the Traitload ingestion pipeline.
//!
//! Errors are split by how far they are allowed to travel:
//!
//! - [`LookupError`] - a reference or entity did not resolve to exactly one row
//! - [`DateError`] - a node's date/time attributes could not be normalized
//! - [`ResolveError`] - lookup failure or a storage failure underneath it
//! - [`Fatal`] - unwinds the walk to the transaction boundary
//! - [`SubmitError`] - infrastructure failure around the transaction itself
//! - [`StoreError`] / [`ConfigError`] - setup of the store and the process
//!
//! Recoverable errors never leave the walker as `Err`: they are recorded in
//! the submission's [`crate::ingest::ErrorSet`] and processing continues.

use thiserror::Error;

// =============================================================================
// Lookup Errors
// =============================================================================

/// A selection did not identify exactly one row.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LookupError {
    /// Zero rows matched.
    #[error("no {kind} matches {criteria}")]
    NotFound { kind: &'static str, criteria: String },

    /// More than one row matched.
    #[error("{count} {kind} rows match {criteria}; add attributes to identify exactly one")]
    NotUnique {
        kind: &'static str,
        criteria: String,
        count: usize,
    },

    /// The selection names a column the reference table cannot be matched on.
    #[error("{kind} cannot be matched on attribute '{column}'")]
    UnknownColumn { kind: &'static str, column: String },

    /// The selection has no usable attributes at all.
    #[error("{kind} reference has no attributes to match on")]
    EmptySelection { kind: &'static str },
}

// =============================================================================
// Resolution Errors
// =============================================================================

/// Failure while resolving a reference or an entity.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The data did not resolve (recoverable for ordinary references).
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// The query itself failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// Date Errors
// =============================================================================

/// Errors while normalizing `local_datetime` / `utc_datetime`.
#[derive(Debug, Error)]
pub enum DateError {
    /// Both attributes were supplied on one node.
    #[error("local_datetime and utc_datetime cannot both be given")]
    BothGiven,

    /// The value does not match the accepted layouts.
    #[error("malformed {attribute} value '{value}'")]
    Malformed {
        attribute: &'static str,
        value: String,
    },

    /// A local time needs a site to know its time zone.
    #[error("local_datetime requires a site (own or inherited)")]
    MissingSite,

    /// The resolved site carries no time zone.
    #[error("site {0} has no time zone; use utc_datetime instead")]
    MissingTimeZone(i64),

    /// The site's time zone is not a readable UTC offset.
    #[error("site {site_id} has unreadable time zone '{value}'")]
    BadTimeZone { site_id: i64, value: String },

    /// A defaults-level local time while descendants switch site.
    #[error("local_datetime on defaults is ambiguous because a descendant specifies its own site")]
    AmbiguousSite,

    /// The time zone lookup failed at the storage level.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// Fatal (walk-aborting) Errors
// =============================================================================

/// An error that unwinds the walk immediately.
///
/// The failing node has already been annotated and the error recorded in the
/// submission's error set when a `Fatal` is returned.
#[derive(Debug, Error)]
pub enum Fatal {
    /// Logical ordering violation inside the document.
    #[error("structural error at '{path}': {message}")]
    Structural { path: String, message: String },

    /// Entity identity is ambiguous.
    #[error("entity at '{path}' could not be resolved: {source}")]
    Entity {
        path: String,
        #[source]
        source: LookupError,
    },

    /// Storage failure; the transaction state is no longer trusted.
    #[error("database failure at '{path}': {source}")]
    Database {
        path: String,
        #[source]
        source: sqlx::Error,
    },
}

// =============================================================================
// Submission Errors (top-level)
// =============================================================================

/// Failure opening, committing or rolling back the submission transaction.
///
/// Everything that happens inside the walk is reported through
/// [`crate::ingest::SubmissionOutcome`] instead.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Transaction handling failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors while connecting to or preparing the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection or DDL failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Could not prepare the database location.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A setting could not be parsed.
    #[error("Invalid value for {name}: '{value}' ({message})")]
    Invalid {
        name: &'static str,
        value: String,
        message: String,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for reference and entity resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type for walker steps.
pub type WalkResult<T> = Result<T, Fatal>;

/// Result type for store setup.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
