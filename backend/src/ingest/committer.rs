//! Insertion of trait rows and their covariates.
//!
//! Row validation failures are soft: the node is annotated and skipped. Any
//! error raised by the database itself is fatal for the whole submission.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::document::{CovariateNode, NodePath};
use crate::error::{Fatal, ResolveError, WalkResult};
use crate::models::{CovariateRow, ReferenceKind, TraitRow, VariableBounds, STAT_NAMES};
use crate::resolve::resolve_reference;
use crate::store::{insert_covariate, insert_trait, variable_bounds};

/// What happened to one trait node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Inserted {
        trait_id: i64,
        covariate_ids: Vec<i64>,
    },
    Rejected,
}

/// Row-level checks run before a trait is inserted.
pub fn validate_trait_row(row: &TraitRow, bounds: VariableBounds, now: DateTime<Utc>) -> Vec<String> {
    let mut errors = Vec::new();

    if row.variable_id.is_none() {
        errors.push("variable must be specified".to_string());
    }
    match row.access_level {
        None => errors.push("access_level must be specified".to_string()),
        Some(level) if !(1..=4).contains(&level) => {
            errors.push(format!("access_level {level} is not between 1 and 4"))
        }
        Some(_) => {}
    }

    if !row.mean.is_finite() {
        errors.push("mean must be a finite number".to_string());
    } else if !bounds.contains(row.mean) {
        errors.push(format!(
            "mean {} is outside the variable's range [{}, {}]",
            row.mean,
            bounds.min.map_or("-inf".to_string(), |v| v.to_string()),
            bounds.max.map_or("inf".to_string(), |v| v.to_string()),
        ));
    }

    if let Some(stat) = &row.stat {
        if !STAT_NAMES.contains(&stat.name.as_str()) {
            errors.push(format!(
                "stat name '{}' is not one of {}",
                stat.name,
                STAT_NAMES.join(", ")
            ));
        }
        if stat.sample_size < 2 {
            errors.push(format!("sample_size {} must be at least 2", stat.sample_size));
        }
        if !stat.value.is_finite() || stat.value < 0.0 {
            errors.push(format!("stat value {} must be a non-negative number", stat.value));
        }
    }

    if let Some(date) = &row.date {
        let in_future = DateTime::parse_from_rfc3339(date)
            .map(|d| d.with_timezone(&Utc) > now)
            .unwrap_or(false);
        if in_future {
            errors.push(format!("date {date} lies in the future"));
        }
    }

    errors
}

fn database_failure(path: &NodePath, error: sqlx::Error, diag: &mut Diagnostics) -> Fatal {
    diag.database(path, &error);
    Fatal::Database {
        path: path.to_string(),
        source: error,
    }
}

/// Validate and insert one trait row, then its covariates.
///
/// Covariates are only attached when `attach_covariates` is set, i.e. the
/// trait's own references all resolved.
pub async fn commit_trait(
    conn: &mut SqliteConnection,
    row: &TraitRow,
    covariates: &[CovariateNode],
    attach_covariates: bool,
    path: &NodePath,
    diag: &mut Diagnostics,
) -> WalkResult<CommitOutcome> {
    let bounds = match row.variable_id {
        Some(id) => variable_bounds(conn, id)
            .await
            .map_err(|e| database_failure(path, e, diag))?,
        None => VariableBounds::default(),
    };

    let problems = validate_trait_row(row, bounds, Utc::now());
    if !problems.is_empty() {
        diag.model_validation(path, &problems);
        return Ok(CommitOutcome::Rejected);
    }

    let trait_id = insert_trait(conn, row)
        .await
        .map_err(|e| database_failure(path, e, diag))?;
    debug!(trait_id, %path, "Inserted trait");

    let mut covariate_ids = Vec::new();
    if !covariates.is_empty() && !attach_covariates {
        debug!(%path, "Skipping covariates of a trait with unresolved references");
    } else {
        for (index, covariate) in covariates.iter().enumerate() {
            let at = path.item("covariates", index);
            if let Some(id) = commit_covariate(conn, trait_id, covariate, &at, diag).await? {
                covariate_ids.push(id);
            }
        }
    }

    Ok(CommitOutcome::Inserted {
        trait_id,
        covariate_ids,
    })
}

async fn commit_covariate(
    conn: &mut SqliteConnection,
    trait_id: i64,
    covariate: &CovariateNode,
    path: &NodePath,
    diag: &mut Diagnostics,
) -> WalkResult<Option<i64>> {
    let variable_path = path.child("variable");
    let variable_id =
        match resolve_reference(conn, ReferenceKind::Variable, &covariate.variable, None).await {
            Ok(id) => id,
            Err(ResolveError::Lookup(e)) => {
                diag.lookup(&variable_path, &e);
                return Ok(None);
            }
            Err(ResolveError::Database(e)) => return Err(database_failure(&variable_path, e, diag)),
        };

    let bounds = variable_bounds(conn, variable_id)
        .await
        .map_err(|e| database_failure(path, e, diag))?;
    if !covariate.level.is_finite() || !bounds.contains(covariate.level) {
        diag.model_validation(
            path,
            &[format!("covariate level {} is outside the variable's range", covariate.level)],
        );
        return Ok(None);
    }

    let row = CovariateRow {
        trait_id,
        variable_id,
        level: covariate.level,
    };
    let id = insert_covariate(conn, &row)
        .await
        .map_err(|e| database_failure(path, e, diag))?;
    Ok(Some(id))
}
