//! Resolution of reference sub-elements to existing row ids.
//!
//! Ordinary lookups are soft: a reference that matches zero or several rows
//! is recorded and simply left out of the node's merge. Ordering problems
//! around treatments are structural and unwind the walk.

use sqlx::SqliteConnection;

use crate::diagnostics::Diagnostics;
use crate::document::{Attributes, NodePath, References};
use crate::error::{Fatal, LookupError, ResolveError, ResolveResult, WalkResult};
use crate::models::{DefaultContext, ReferenceKind};
use crate::store::{describe_selection, find_reference_ids};

/// Change a node makes to one inherited key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUpdate {
    Set(i64),
    Clear,
}

/// Key changes produced by one node, in resolution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyUpdates(Vec<(ReferenceKind, KeyUpdate)>);

impl KeyUpdates {
    fn push(&mut self, kind: ReferenceKind, update: KeyUpdate) {
        self.0.push((kind, update));
    }

    /// Id this node resolved for `kind`, if any.
    pub fn resolved(&self, kind: ReferenceKind) -> Option<i64> {
        self.0.iter().rev().find_map(|(k, u)| match (k, u) {
            (k, KeyUpdate::Set(id)) if *k == kind => Some(*id),
            _ => None,
        })
    }

    /// Apply to an owned context clone.
    pub fn apply(&self, ctx: &mut DefaultContext) {
        for (kind, update) in &self.0 {
            match update {
                KeyUpdate::Set(id) => ctx.set(*kind, *id),
                KeyUpdate::Clear => ctx.clear(*kind),
            }
        }
    }
}

/// Resolve a selection that must match exactly one row.
pub async fn resolve_reference(
    conn: &mut SqliteConnection,
    kind: ReferenceKind,
    selection: &Attributes,
    treatment_citation: Option<i64>,
) -> ResolveResult<i64> {
    let ids = find_reference_ids(conn, kind, selection, treatment_citation).await?;
    match ids.as_slice() {
        [id] => Ok(*id),
        [] => Err(LookupError::NotFound {
            kind: kind.name(),
            criteria: criteria(selection, treatment_citation),
        }
        .into()),
        many => Err(LookupError::NotUnique {
            kind: kind.name(),
            criteria: criteria(selection, treatment_citation),
            count: many.len(),
        }
        .into()),
    }
}

fn criteria(selection: &Attributes, treatment_citation: Option<i64>) -> String {
    let base = describe_selection(selection);
    match treatment_citation {
        Some(citation_id) => format!("{base} for citation {citation_id}"),
        None => base,
    }
}

/// Resolve one reference, recording soft failures.
///
/// `Ok(None)` means the lookup failed and was recorded.
async fn resolve_soft(
    conn: &mut SqliteConnection,
    kind: ReferenceKind,
    selection: &Attributes,
    treatment_citation: Option<i64>,
    path: &NodePath,
    diag: &mut Diagnostics,
) -> WalkResult<Option<i64>> {
    match resolve_reference(conn, kind, selection, treatment_citation).await {
        Ok(id) => Ok(Some(id)),
        Err(ResolveError::Lookup(e)) => {
            diag.lookup(path, &e);
            Ok(None)
        }
        Err(ResolveError::Database(e)) => {
            diag.database(path, &e);
            Err(Fatal::Database {
                path: path.to_string(),
                source: e,
            })
        }
    }
}

fn structural(path: &NodePath, message: &str, diag: &mut Diagnostics) -> Fatal {
    diag.structural(path, message);
    Fatal::Structural {
        path: path.to_string(),
        message: message.to_string(),
    }
}

/// Resolve every reference sub-element of one node.
///
/// `inherited` is only read: to reject a citation reset below an inherited
/// treatment and to find the citation a treatment is scoped by.
pub async fn resolve_foreign_keys(
    conn: &mut SqliteConnection,
    refs: &References,
    inherited: &DefaultContext,
    path: &NodePath,
    diag: &mut Diagnostics,
) -> WalkResult<KeyUpdates> {
    if refs.citation.is_some()
        && refs.treatment.is_none()
        && inherited.get(ReferenceKind::Treatment).is_some()
    {
        return Err(structural(
            &path.child("citation"),
            "citation cannot be reset below an inherited treatment; restate the treatment with it",
            diag,
        ));
    }

    let mut updates = KeyUpdates::default();

    let simple = [
        (ReferenceKind::Site, &refs.site),
        (ReferenceKind::Citation, &refs.citation),
        (ReferenceKind::Variable, &refs.variable),
        (ReferenceKind::Method, &refs.method),
    ];
    for (kind, selection) in simple {
        if let Some(selection) = selection {
            let at = path.child(kind.name());
            if let Some(id) = resolve_soft(conn, kind, selection, None, &at, diag).await? {
                updates.push(kind, KeyUpdate::Set(id));
            }
        }
    }

    if let Some(species) = &refs.species {
        let at = path.child("species");
        // A species override never keeps the cultivar of another species.
        let cultivar = match &species.cultivar {
            Some(selection) => {
                let cultivar_path = at.child("cultivar");
                resolve_soft(conn, ReferenceKind::Cultivar, selection, None, &cultivar_path, diag)
                    .await?
            }
            None => None,
        };
        updates.push(
            ReferenceKind::Cultivar,
            cultivar.map_or(KeyUpdate::Clear, KeyUpdate::Set),
        );

        if let Some(id) =
            resolve_soft(conn, ReferenceKind::Species, &species.attributes, None, &at, diag).await?
        {
            updates.push(ReferenceKind::Species, KeyUpdate::Set(id));
        }
    }

    if let Some(selection) = &refs.treatment {
        let at = path.child("treatment");
        let citation = updates
            .resolved(ReferenceKind::Citation)
            .or_else(|| inherited.get(ReferenceKind::Citation));
        let Some(citation_id) = citation else {
            return Err(structural(
                &at,
                "treatment requires a citation (own or inherited) to be validated against",
                diag,
            ));
        };
        if let Some(id) =
            resolve_soft(conn, ReferenceKind::Treatment, selection, Some(citation_id), &at, diag)
                .await?
        {
            updates.push(ReferenceKind::Treatment, KeyUpdate::Set(id));
        }
    }

    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_store, seed_reference_data};
    use serde_json::json;

    fn refs(value: serde_json::Value) -> References {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_each_kind() {
        let pool = memory_store().await;
        let seed = seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut diag = Diagnostics::new();

        let node = refs(json!({
            "site": { "sitename": "Urbana" },
            "species": { "scientificname": "Zea mays", "cultivar": { "name": "B73" } },
            "citation": { "author": "Smith", "year": 2001 },
            "treatment": { "name": "control" },
            "variable": { "name": "height" },
            "method": { "name": "ruler" }
        }));
        let updates = resolve_foreign_keys(
            &mut conn,
            &node,
            &DefaultContext::default(),
            &NodePath::root(),
            &mut diag,
        )
        .await
        .unwrap();

        let mut ctx = DefaultContext::default();
        updates.apply(&mut ctx);
        assert!(diag.errors.is_empty(), "{:?}", diag.errors);
        assert_eq!(ctx.get(ReferenceKind::Site), Some(seed.site_urbana));
        assert_eq!(ctx.get(ReferenceKind::Species), Some(seed.species_maize));
        assert_eq!(ctx.get(ReferenceKind::Cultivar), Some(seed.cultivar_b73));
        assert_eq!(ctx.get(ReferenceKind::Citation), Some(seed.citation_smith));
        assert_eq!(ctx.get(ReferenceKind::Treatment), Some(seed.treatment_smith_control));
        assert_eq!(ctx.get(ReferenceKind::Variable), Some(seed.variable_height));
        assert_eq!(ctx.get(ReferenceKind::Method), Some(seed.method_ruler));
    }

    #[tokio::test]
    async fn test_not_found_is_soft_and_annotated() {
        let pool = memory_store().await;
        let seed = seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut diag = Diagnostics::new();

        let mut inherited = DefaultContext::default();
        inherited.set(ReferenceKind::Site, seed.site_ames);

        let node = refs(json!({ "site": { "sitename": "Atlantis" }, "method": { "name": "ruler" } }));
        let updates =
            resolve_foreign_keys(&mut conn, &node, &inherited, &NodePath::root(), &mut diag)
                .await
                .unwrap();

        let mut ctx = inherited.clone();
        updates.apply(&mut ctx);
        assert_eq!(diag.errors.lookup.len(), 1);
        assert_eq!(diag.errors.lookup[0].path.as_str(), "/site");
        assert_eq!(ctx.get(ReferenceKind::Site), Some(seed.site_ames));
        assert_eq!(ctx.get(ReferenceKind::Method), Some(seed.method_ruler));
    }

    #[tokio::test]
    async fn test_species_override_clears_inherited_cultivar() {
        let pool = memory_store().await;
        let seed = seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut diag = Diagnostics::new();

        let mut inherited = DefaultContext::default();
        inherited.set(ReferenceKind::Species, seed.species_maize);
        inherited.set(ReferenceKind::Cultivar, seed.cultivar_b73);

        let node = refs(json!({ "species": { "scientificname": "Glycine max" } }));
        let updates =
            resolve_foreign_keys(&mut conn, &node, &inherited, &NodePath::root(), &mut diag)
                .await
                .unwrap();

        let mut ctx = inherited.clone();
        updates.apply(&mut ctx);
        assert_eq!(ctx.get(ReferenceKind::Species), Some(seed.species_soy));
        assert_eq!(ctx.get(ReferenceKind::Cultivar), None);
        assert_eq!(inherited.get(ReferenceKind::Cultivar), Some(seed.cultivar_b73));
    }

    #[tokio::test]
    async fn test_treatment_without_citation_is_structural() {
        let pool = memory_store().await;
        seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut diag = Diagnostics::new();

        let node = refs(json!({ "treatment": { "name": "control" } }));
        let err = resolve_foreign_keys(
            &mut conn,
            &node,
            &DefaultContext::default(),
            &NodePath::root().item("traits", 0),
            &mut diag,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Fatal::Structural { .. }));
        assert_eq!(diag.errors.structural.len(), 1);
        assert_eq!(diag.errors.structural[0].path.as_str(), "/traits/0/treatment");
    }

    #[tokio::test]
    async fn test_treatment_uses_inherited_citation() {
        let pool = memory_store().await;
        let seed = seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut diag = Diagnostics::new();

        let mut inherited = DefaultContext::default();
        inherited.set(ReferenceKind::Citation, seed.citation_jones);

        let node = refs(json!({ "treatment": { "name": "control" } }));
        let updates =
            resolve_foreign_keys(&mut conn, &node, &inherited, &NodePath::root(), &mut diag)
                .await
                .unwrap();
        assert_eq!(updates.resolved(ReferenceKind::Treatment), Some(seed.treatment_jones_control));

        // "irrigated" only exists under Smith.
        let node = refs(json!({ "treatment": { "name": "irrigated" } }));
        resolve_foreign_keys(&mut conn, &node, &inherited, &NodePath::root(), &mut diag)
            .await
            .unwrap();
        assert_eq!(diag.errors.lookup.len(), 1);

        let node = refs(json!({ "citation": { "author": "Smith" }, "treatment": { "name": "irrigated" } }));
        let updates =
            resolve_foreign_keys(&mut conn, &node, &inherited, &NodePath::root(), &mut diag)
                .await
                .unwrap();
        assert_eq!(updates.resolved(ReferenceKind::Treatment), Some(seed.treatment_irrigated));
    }

    #[tokio::test]
    async fn test_citation_reset_under_inherited_treatment_is_rejected() {
        let pool = memory_store().await;
        let seed = seed_reference_data(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut diag = Diagnostics::new();

        let mut inherited = DefaultContext::default();
        inherited.set(ReferenceKind::Citation, seed.citation_smith);
        inherited.set(ReferenceKind::Treatment, seed.treatment_smith_control);

        let node = refs(json!({ "citation": { "author": "Jones" } }));
        let err = resolve_foreign_keys(&mut conn, &node, &inherited, &NodePath::root(), &mut diag)
            .await
            .unwrap_err();
        assert!(matches!(err, Fatal::Structural { .. }));
        assert!(diag.errors.lookup.is_empty());
    }
}
