//! Merging one node's overrides into an inherited context.

use sqlx::SqliteConnection;

use super::datetime::{normalize_date, DateScope};
use super::foreign_keys::resolve_foreign_keys;
use crate::diagnostics::Diagnostics;
use crate::document::{NodePath, Overrides};
use crate::error::{DateError, Fatal, WalkResult};
use crate::models::{DefaultContext, ReferenceKind};

/// Produce the context in effect for a node.
///
/// The inherited context is cloned, never modified. Foreign keys are merged
/// first so that a node's own site decides the zone of its local time; date
/// problems are recorded and leave the inherited date in place.
pub async fn merge_overrides(
    conn: &mut SqliteConnection,
    inherited: &DefaultContext,
    overrides: &Overrides,
    scope: DateScope,
    path: &NodePath,
    diag: &mut Diagnostics,
) -> WalkResult<DefaultContext> {
    let updates = resolve_foreign_keys(conn, &overrides.references, inherited, path, diag).await?;

    let mut ctx = inherited.clone();
    updates.apply(&mut ctx);

    match normalize_date(conn, overrides, ctx.get(ReferenceKind::Site), scope).await {
        Ok(Some(date)) => ctx.date = Some(date),
        Ok(None) => {}
        Err(DateError::Database(e)) => {
            diag.database(path, &e);
            return Err(Fatal::Database {
                path: path.to_string(),
                source: e,
            });
        }
        Err(e) => diag.date(path, &e),
    }

    if let Some(level) = overrides.access_level {
        ctx.access_level = Some(level);
    }

    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_store, seed_reference_data};
    use serde_json::json;

    fn overrides(value: serde_json::Value) -> Overrides {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_merge_keeps_parent_untouched() {
        let pool = memory_store().await;
        let seed = seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut diag = Diagnostics::new();

        let mut parent = DefaultContext::default();
        parent.set(ReferenceKind::Site, seed.site_ames);
        parent.access_level = Some(2);
        let snapshot = parent.clone();

        let child = merge_overrides(
            &mut conn,
            &parent,
            &overrides(json!({
                "site": { "sitename": "Urbana" },
                "local_datetime": "2021-07-04T08:30:00",
                "access_level": 4
            })),
            DateScope::Trait,
            &NodePath::root(),
            &mut diag,
        )
        .await
        .unwrap();

        assert!(diag.errors.is_empty(), "{:?}", diag.errors);
        assert_eq!(parent, snapshot);
        assert_eq!(child.get(ReferenceKind::Site), Some(seed.site_urbana));
        assert_eq!(child.access_level, Some(4));
        // Urbana is UTC-5, so its own zone is used, not the inherited Ames one.
        assert_eq!(child.date.unwrap().to_storage(), "2021-07-04T13:30:00Z");
    }

    #[tokio::test]
    async fn test_bad_date_is_soft() {
        let pool = memory_store().await;
        seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut diag = Diagnostics::new();

        let ctx = merge_overrides(
            &mut conn,
            &DefaultContext::default(),
            &overrides(json!({ "utc_datetime": "yesterday", "access_level": 1 })),
            DateScope::Trait,
            &NodePath::root().item("traits", 3),
            &mut diag,
        )
        .await
        .unwrap();

        assert!(ctx.date.is_none());
        assert_eq!(ctx.access_level, Some(1));
        assert_eq!(diag.errors.date_specification.len(), 1);
        assert_eq!(diag.errors.date_specification[0].path.as_str(), "/traits/3");
    }
}
