//! Per-submission error accumulation.
//!
//! A [`Diagnostics`] value is owned by one walk. Each recorded error lands in
//! exactly one of the five [`ErrorSet`] lists and, at the same time, queues
//! the annotation that will be written onto the implicated node.

use serde::Serialize;
use tracing::warn;

use crate::document::{AnnotationKey, Annotations, NodePath};
use crate::error::{DateError, LookupError};

/// One recorded error, located by the node it concerns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeError {
    pub path: NodePath,
    pub message: String,
}

/// The five independent error accumulators of a submission.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorSet {
    pub structural: Vec<NodeError>,
    pub lookup: Vec<NodeError>,
    pub model_validation: Vec<NodeError>,
    pub database: Vec<NodeError>,
    pub date_specification: Vec<NodeError>,
}

impl ErrorSet {
    /// True when every accumulator is empty, i.e. the submission may commit.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn total(&self) -> usize {
        self.structural.len()
            + self.lookup.len()
            + self.model_validation.len()
            + self.database.len()
            + self.date_specification.len()
    }

    /// Get summary statistics
    pub fn summary(&self) -> String {
        format!(
            "{} structural, {} lookup, {} model validation, {} database, {} date",
            self.structural.len(),
            self.lookup.len(),
            self.model_validation.len(),
            self.database.len(),
            self.date_specification.len()
        )
    }
}

/// Errors plus the annotations they imply.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub errors: ErrorSet,
    pub annotations: Annotations,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn structural(&mut self, path: &NodePath, message: impl Into<String>) {
        let message = message.into();
        warn!(%path, %message, "Structural error");
        self.annotations.add(path, AnnotationKey::Error, message.clone());
        self.errors.structural.push(NodeError { path: path.clone(), message });
    }

    pub fn lookup(&mut self, path: &NodePath, error: &LookupError) {
        let message = error.to_string();
        warn!(%path, %message, "Lookup failed");
        self.annotations.add(path, AnnotationKey::Error, message.clone());
        self.errors.lookup.push(NodeError { path: path.clone(), message });
    }

    pub fn date(&mut self, path: &NodePath, error: &DateError) {
        let message = error.to_string();
        warn!(%path, %message, "Date specification rejected");
        self.annotations.add(path, AnnotationKey::Error, message.clone());
        self.errors
            .date_specification
            .push(NodeError { path: path.clone(), message });
    }

    pub fn model_validation(&mut self, path: &NodePath, messages: &[String]) {
        let message = messages.join("; ");
        warn!(%path, %message, "Row failed validation");
        self.annotations
            .add(path, AnnotationKey::ModelValidationErrors, message.clone());
        self.errors
            .model_validation
            .push(NodeError { path: path.clone(), message });
    }

    pub fn database(&mut self, path: &NodePath, error: &sqlx::Error) {
        let message = error.to_string();
        warn!(%path, %message, "Database rejected statement");
        self.annotations
            .add(path, AnnotationKey::DatabaseException, message.clone());
        self.errors.database.push(NodeError { path: path.clone(), message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_category_is_independent() {
        let mut diag = Diagnostics::new();
        assert!(diag.errors.is_empty());

        let path = NodePath::root().item("traits", 0);
        diag.lookup(
            &path.child("site"),
            &LookupError::NotFound { kind: "site", criteria: "sitename = 'x'".into() },
        );
        diag.model_validation(&path, &["mean out of range".into(), "no variable".into()]);
        diag.date(&path, &DateError::BothGiven);

        assert_eq!(diag.errors.lookup.len(), 1);
        assert_eq!(diag.errors.model_validation.len(), 1);
        assert_eq!(diag.errors.date_specification.len(), 1);
        assert!(diag.errors.structural.is_empty());
        assert_eq!(diag.errors.total(), 3);
        assert_eq!(diag.annotations.len(), 3);
        assert_eq!(diag.errors.model_validation[0].message, "mean out of range; no variable");
    }

    #[test]
    fn test_summary() {
        let mut diag = Diagnostics::new();
        diag.structural(&NodePath::root(), "bad");
        assert!(diag.errors.summary().starts_with("1 structural"));
    }
}
