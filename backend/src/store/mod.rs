//! Relational store access.
//!
//! Every query here runs on a borrowed [`SqliteConnection`], which during a
//! submission is the connection behind the submission's transaction. Nothing
//! in this module commits or rolls back.

pub mod schema;

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::info;

use crate::document::Attributes;
use crate::error::{LookupError, ResolveResult, StoreResult};
use crate::models::{CovariateRow, ReferenceKind, TraitRow, VariableBounds};

pub use schema::{init_schema, table_names};

// =============================================================================
// Connection
// =============================================================================

/// Open a connection pool, creating the database file when missing.
pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    info!(database_url, max_connections, "Connected to store");
    Ok(pool)
}

// =============================================================================
// Exact-match Selection
// =============================================================================

enum SqlValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
}

impl SqlValue {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

/// Human readable form of a selection, used in error messages.
pub fn describe_selection(selection: &Attributes) -> String {
    selection
        .iter()
        .map(|(column, value)| match value {
            Value::String(s) => format!("{column} = '{s}'"),
            Value::Null => format!("{column} IS NULL"),
            other => format!("{column} = {other}"),
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Ids of the rows of `kind` matching every attribute of `selection`.
///
/// Column names are checked against the kind's whitelist before any SQL is
/// built. `treatment_citation` restricts treatments to those associated with
/// the given citation.
pub async fn find_reference_ids(
    conn: &mut SqliteConnection,
    kind: ReferenceKind,
    selection: &Attributes,
    treatment_citation: Option<i64>,
) -> ResolveResult<Vec<i64>> {
    if selection.is_empty() {
        return Err(LookupError::EmptySelection { kind: kind.name() }.into());
    }

    let table = kind.table();
    let mut conditions = Vec::with_capacity(selection.len() + 1);
    let mut binds = Vec::with_capacity(selection.len() + 1);

    for (column, value) in selection {
        if !kind.allows_column(column) {
            return Err(LookupError::UnknownColumn {
                kind: kind.name(),
                column: column.clone(),
            }
            .into());
        }
        match SqlValue::from_json(value) {
            SqlValue::Null => conditions.push(format!("t.{column} IS NULL")),
            bind => {
                conditions.push(format!("t.{column} = ?"));
                binds.push(bind);
            }
        }
    }

    if let Some(citation_id) = treatment_citation {
        conditions.push(
            "EXISTS (SELECT 1 FROM citations_treatments ct \
             WHERE ct.treatment_id = t.id AND ct.citation_id = ?)"
                .to_string(),
        );
        binds.push(SqlValue::Integer(citation_id));
    }

    let sql = format!(
        "SELECT t.id FROM {} t WHERE {} ORDER BY t.id",
        table.table,
        conditions.join(" AND ")
    );

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for bind in binds {
        query = match bind {
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Integer(i) => query.bind(i),
            SqlValue::Real(f) => query.bind(f),
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::Null => query,
        };
    }

    Ok(query.fetch_all(&mut *conn).await?)
}

// =============================================================================
// Entities
// =============================================================================

/// Entities sharing `name`, as `(id, notes)`.
pub async fn find_entities_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Vec<(i64, Option<String>)>, sqlx::Error> {
    sqlx::query_as("SELECT id, notes FROM entities WHERE name = ? ORDER BY id")
        .bind(name)
        .fetch_all(&mut *conn)
        .await
}

pub async fn insert_entity(
    conn: &mut SqliteConnection,
    name: Option<&str>,
    notes: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query("INSERT INTO entities (name, notes) VALUES (?, ?)")
        .bind(name)
        .bind(notes)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

// =============================================================================
// Site Time Zones / Variable Bounds
// =============================================================================

/// The site's `time_zone`, `None` when the column is null or the site is gone.
pub async fn site_time_zone(
    conn: &mut SqliteConnection,
    site_id: i64,
) -> Result<Option<String>, sqlx::Error> {
    let zone: Option<Option<String>> = sqlx::query_scalar("SELECT time_zone FROM sites WHERE id = ?")
        .bind(site_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(zone.flatten().filter(|z| !z.trim().is_empty()))
}

pub async fn variable_bounds(
    conn: &mut SqliteConnection,
    variable_id: i64,
) -> Result<VariableBounds, sqlx::Error> {
    let bounds: Option<(Option<f64>, Option<f64>)> =
        sqlx::query_as("SELECT min, max FROM variables WHERE id = ?")
            .bind(variable_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(bounds
        .map(|(min, max)| VariableBounds { min, max })
        .unwrap_or_default())
}

// =============================================================================
// Users
// =============================================================================

pub async fn user_exists(pool: &SqlitePool, user_id: i64) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

// =============================================================================
// Traits / Covariates
// =============================================================================

pub async fn insert_trait(conn: &mut SqliteConnection, row: &TraitRow) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO traits (
            entity_id, site_id, specie_id, cultivar_id, citation_id,
            treatment_id, variable_id, method_id,
            mean, statname, stat, n, notes,
            date, dateloc, timeloc, access_level, user_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(row.entity_id)
    .bind(row.site_id)
    .bind(row.specie_id)
    .bind(row.cultivar_id)
    .bind(row.citation_id)
    .bind(row.treatment_id)
    .bind(row.variable_id)
    .bind(row.method_id)
    .bind(row.mean)
    .bind(row.stat.as_ref().map(|s| s.name.clone()))
    .bind(row.stat.as_ref().map(|s| s.value))
    .bind(row.stat.as_ref().map(|s| s.sample_size))
    .bind(&row.notes)
    .bind(&row.date)
    .bind(row.dateloc)
    .bind(row.timeloc)
    .bind(row.access_level)
    .bind(row.user_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn insert_covariate(
    conn: &mut SqliteConnection,
    row: &CovariateRow,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query("INSERT INTO covariates (trait_id, variable_id, level) VALUES (?, ?, ?)")
        .bind(row.trait_id)
        .bind(row.variable_id)
        .bind(row.level)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Row count of one of the managed tables.
pub async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64, sqlx::Error> {
    if !table_names().any(|t| t == table) {
        return Err(sqlx::Error::Protocol(format!("unknown table '{table}'")));
    }
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
}
