//! JSON Schema validation of trait-data-set documents.
//!
//! This is the gate in front of the ingestion transaction: a document that
//! violates the grammar is rejected before any row is read or written.
//!
//! The grammar is embedded at compile time from
//! `schemas/trait-data-set.json` (JSON Schema Draft 7). It fixes the node
//! shapes (group, defaults, trait, covariate), requires `mean` on traits,
//! bounds `access_level` to 1..=4 and closes the attribute set of every
//! reference element to the columns it can be matched on.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use traitload::validate_document;
//!
//! let doc = json!({ "traits": [{ "mean": 1.5, "variable": { "name": "height" } }] });
//! assert!(validate_document(&doc).is_ok());
//!
//! let bad = json!({ "traits": [{ "variable": { "name": "height" } }] });
//! assert!(validate_document(&bad).is_err());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

/// Raw text of the embedded grammar.
pub const DOCUMENT_SCHEMA: &str = include_str!("../../schemas/trait-data-set.json");

static SCHEMA: Lazy<Result<Value, String>> = Lazy::new(|| {
    serde_json::from_str(DOCUMENT_SCHEMA).map_err(|e| format!("Invalid embedded schema: {e}"))
});

/// One schema violation and where it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON Pointer to the offending value (`""` for the document root)
    pub pointer: String,
    pub message: String,
}

/// Validate a JSON value against a JSON schema, keeping instance locations.
pub fn violations(schema: &Value, data: &Value) -> Result<(), Vec<SchemaViolation>> {
    let validator = jsonschema::draft7::new(schema).map_err(|e| {
        vec![SchemaViolation {
            pointer: String::new(),
            message: format!("Invalid schema: {}", e),
        }]
    })?;

    let errors: Vec<SchemaViolation> = validator
        .iter_errors(data)
        .map(|e| SchemaViolation {
            pointer: e.instance_path().as_str().to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` when valid
/// * `Err(Vec<String>)` with one message per violation
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    violations(schema, data)
        .map_err(|errors| errors.into_iter().map(|v| v.message).collect())
}

/// Quick true/false check against any schema.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate a submission against the trait-data-set grammar.
pub fn validate_document(data: &Value) -> Result<(), Vec<String>> {
    match SCHEMA.as_ref() {
        Ok(schema) => validate(schema, data),
        Err(e) => Err(vec![e.clone()]),
    }
}

/// Validate a submission, keeping the location of each violation.
pub fn document_violations(data: &Value) -> Result<(), Vec<SchemaViolation>> {
    match SCHEMA.as_ref() {
        Ok(schema) => violations(schema, data),
        Err(e) => Err(vec![SchemaViolation {
            pointer: String::new(),
            message: e.clone(),
        }]),
    }
}

/// Quick check against the trait-data-set grammar.
pub fn is_valid_document(data: &Value) -> bool {
    SCHEMA
        .as_ref()
        .map(|schema| is_valid(schema, data))
        .unwrap_or(false)
}
