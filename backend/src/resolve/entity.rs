//! Get-or-create resolution of entity nodes.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::document::EntityNode;
use crate::error::{LookupError, ResolveResult};
use crate::store::{find_entities_by_name, insert_entity};

/// Outcome of a get-or-create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityResolution {
    pub id: i64,
    pub created: bool,
}

/// Find the entity named by `node`, or create it.
///
/// Candidates are matched by the exact name, surrounding whitespace included;
/// trimming only decides whether the name is blank. A blank name or no
/// candidate creates a new entity from the supplied attributes. A single
/// candidate is reused unless the node supplies notes that disagree with the
/// stored ones, which is reported as `NotFound`. Several candidates are
/// `NotUnique`.
pub async fn get_or_create_entity(
    conn: &mut SqliteConnection,
    node: &EntityNode,
) -> ResolveResult<EntityResolution> {
    let name = node.name.as_deref().unwrap_or_default();

    if name.trim().is_empty() {
        let id = insert_entity(conn, node.name.as_deref(), node.notes.as_deref()).await?;
        debug!(entity_id = id, "Created unnamed entity");
        return Ok(EntityResolution { id, created: true });
    }

    let candidates = find_entities_by_name(conn, name).await?;
    match candidates.as_slice() {
        [] => {
            let id = insert_entity(conn, Some(name), node.notes.as_deref()).await?;
            debug!(entity_id = id, name, "Created entity");
            Ok(EntityResolution { id, created: true })
        }
        [(id, stored_notes)] => match node.notes.as_deref() {
            Some(notes) if notes != stored_notes.as_deref().unwrap_or_default() => {
                Err(LookupError::NotFound {
                    kind: "entity",
                    criteria: format!("name = '{name}' AND notes = '{notes}'"),
                }
                .into())
            }
            _ => {
                debug!(entity_id = id, name, "Reusing entity");
                Ok(EntityResolution { id: *id, created: false })
            }
        },
        many => Err(LookupError::NotUnique {
            kind: "entity",
            criteria: format!("name = '{name}'"),
            count: many.len(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::test_support::{memory_store, seed_reference_data};

    fn entity(name: Option<&str>, notes: Option<&str>) -> EntityNode {
        EntityNode {
            name: name.map(String::from),
            notes: notes.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_creates_then_reuses() {
        let pool = memory_store().await;
        seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let first = get_or_create_entity(&mut conn, &entity(Some("plot 9"), None))
            .await
            .unwrap();
        assert!(first.created);

        let second = get_or_create_entity(&mut conn, &entity(Some("plot 9"), None))
            .await
            .unwrap();
        assert_eq!(second, EntityResolution { id: first.id, created: false });
    }

    #[tokio::test]
    async fn test_matching_notes_reuse() {
        let pool = memory_store().await;
        let seed = seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let found = get_or_create_entity(&mut conn, &entity(Some("plot 1"), Some("north")))
            .await
            .unwrap();
        assert_eq!(found.id, seed.entity_plot1);
        assert!(!found.created);
    }

    #[tokio::test]
    async fn test_conflicting_notes_is_not_found() {
        let pool = memory_store().await;
        seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let err = get_or_create_entity(&mut conn, &entity(Some("plot 1"), Some("south")))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Lookup(LookupError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_names_are_not_unique() {
        let pool = memory_store().await;
        seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let err = get_or_create_entity(&mut conn, &entity(Some("plot dup"), None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Lookup(LookupError::NotUnique { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_name_is_matched_untrimmed() {
        let pool = memory_store().await;
        let seed = seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let padded = get_or_create_entity(&mut conn, &entity(Some("plot 1 "), None))
            .await
            .unwrap();
        assert!(padded.created);
        assert_ne!(padded.id, seed.entity_plot1);

        let stored: String = sqlx::query_scalar("SELECT name FROM entities WHERE id = ?")
            .bind(padded.id)
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(stored, "plot 1 ");
    }

    #[tokio::test]
    async fn test_blank_name_always_creates() {
        let pool = memory_store().await;
        let mut conn = pool.acquire().await.unwrap();

        let a = get_or_create_entity(&mut conn, &entity(Some("  "), Some("x"))).await.unwrap();
        let b = get_or_create_entity(&mut conn, &entity(None, None)).await.unwrap();
        assert!(a.created && b.created);
        assert_ne!(a.id, b.id);
    }
}
