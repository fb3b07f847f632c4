//! Submission coordinator: one document, one transaction.
//!
//! ```text
//! document ─▶ schema check ─▶ typed tree ─▶ user check ─▶ BEGIN
//!                                                          │
//!                                              GroupWalker (root group)
//!                                                          │
//!                           flawless && !dry_run ? COMMIT : ROLLBACK
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use traitload::ingest::{submit, SubmitOptions};
//!
//! let outcome = submit(&pool, document, SubmitOptions::new(user_id)).await?;
//! if !outcome.is_committed() {
//!     println!("{}", outcome.errors.summary());
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use super::walker::GroupWalker;
use crate::diagnostics::{Diagnostics, ErrorSet};
use crate::document::{GroupNode, NodePath};
use crate::error::SubmitError;
use crate::models::DefaultContext;
use crate::store::user_exists;
use crate::validation::document_violations;

/// Options for one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Recorded as `user_id` on every inserted trait
    pub user_id: i64,

    /// Walk everything, then always roll back
    pub dry_run: bool,
}

impl SubmitOptions {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Final state of a submission's transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Every insertion is durable.
    Committed,
    /// The walk ran (fully or until a fatal error) and nothing persisted.
    RolledBack,
    /// The document was refused before a transaction was opened.
    Rejected,
}

/// Everything the caller needs to report on a submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,

    /// Ids of the inserted traits; empty unless the walk was flawless
    pub created_trait_ids: Vec<i64>,

    /// Ids of the inserted covariates; empty unless the walk was flawless
    pub created_covariate_ids: Vec<i64>,

    /// The five error accumulators
    pub errors: ErrorSet,

    /// Message of the error that unwound the walk, if any
    pub aborted_by: Option<String>,

    /// The submitted document with error annotations attached
    pub document: Value,
}

impl SubmissionOutcome {
    pub fn is_committed(&self) -> bool {
        self.status == SubmissionStatus::Committed
    }

    fn rejected(submission_id: Uuid, mut document: Value, diag: Diagnostics) -> Self {
        diag.annotations.apply(&mut document);
        Self {
            submission_id,
            status: SubmissionStatus::Rejected,
            created_trait_ids: Vec::new(),
            created_covariate_ids: Vec::new(),
            errors: diag.errors,
            aborted_by: None,
            document,
        }
    }
}

/// Process one document inside a single transaction.
///
/// Errors found in the document never surface as `Err`; they are reported
/// in the returned outcome. `Err` means the store could not be queried, or
/// the transaction could not be opened or committed. A failed rollback is
/// recorded as a database error on the root and the outcome still returns.
pub async fn submit(
    pool: &SqlitePool,
    document: Value,
    options: SubmitOptions,
) -> Result<SubmissionOutcome, SubmitError> {
    let submission_id = Uuid::new_v4();
    let span = tracing::info_span!("submission", %submission_id, user_id = options.user_id);
    run(pool, document, options, submission_id)
        .instrument(span)
        .await
}

async fn run(
    pool: &SqlitePool,
    mut document: Value,
    options: SubmitOptions,
    submission_id: Uuid,
) -> Result<SubmissionOutcome, SubmitError> {
    info!(dry_run = options.dry_run, "Submission started");
    let root = NodePath::root();

    // 1. Structure
    if let Err(violations) = document_violations(&document) {
        let mut diag = Diagnostics::new();
        for violation in violations {
            diag.structural(&NodePath::from_pointer(&violation.pointer), violation.message);
        }
        warn!(errors = diag.errors.total(), "Document rejected by schema");
        return Ok(SubmissionOutcome::rejected(submission_id, document, diag));
    }

    let tree: GroupNode = match serde_json::from_value(document.clone()) {
        Ok(tree) => tree,
        Err(e) => {
            let mut diag = Diagnostics::new();
            diag.structural(&root, format!("document could not be read: {e}"));
            return Ok(SubmissionOutcome::rejected(submission_id, document, diag));
        }
    };
    debug!(traits = tree.trait_count(), "Document decoded");

    // 2. Acting user
    if !user_exists(pool, options.user_id).await? {
        let mut diag = Diagnostics::new();
        diag.structural(&root, format!("user {} does not exist", options.user_id));
        return Ok(SubmissionOutcome::rejected(submission_id, document, diag));
    }

    // 3. Walk inside the transaction
    let mut tx = pool.begin().await?;
    let mut walker = GroupWalker::new(options.user_id);
    let walked = walker
        .walk_group(&mut *tx, &tree, DefaultContext::default(), root)
        .await;
    let mut report = walker.finish();

    let aborted_by = walked.err().map(|fatal| fatal.to_string());
    let flawless = aborted_by.is_none() && report.diagnostics.errors.is_empty();

    // 4. Commit or roll back
    let status = if flawless && !options.dry_run {
        tx.commit().await?;
        info!(
            traits = report.created_trait_ids.len(),
            covariates = report.created_covariate_ids.len(),
            entities = report.entities_created,
            "Submission committed"
        );
        SubmissionStatus::Committed
    } else {
        if let Err(e) = tx.rollback().await {
            warn!(error = %e, "Rollback failed");
            report.diagnostics.database(&NodePath::root(), &e);
        }
        info!(
            flawless,
            dry_run = options.dry_run,
            errors = %report.diagnostics.errors.summary(),
            aborted_by = aborted_by.as_deref().unwrap_or(""),
            "Submission rolled back"
        );
        SubmissionStatus::RolledBack
    };

    let annotations = &report.diagnostics.annotations;
    if !annotations.is_empty() {
        debug!(count = annotations.len(), "Annotating document");
        annotations.apply(&mut document);
    }

    let (created_trait_ids, created_covariate_ids) = if flawless {
        (report.created_trait_ids, report.created_covariate_ids)
    } else {
        (Vec::new(), Vec::new())
    };

    Ok(SubmissionOutcome {
        submission_id,
        status,
        created_trait_ids,
        created_covariate_ids,
        errors: report.diagnostics.errors,
        aborted_by,
        document,
    })
}
