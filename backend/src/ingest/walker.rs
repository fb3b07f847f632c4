//! Depth-first traversal of the group/trait tree.
//!
//! ```text
//! group ── entity?    -> ctx.entity_id            (always wins over ancestors)
//!       ── defaults?  -> merge_overrides(ctx)
//!       ── traits[]   -> visit_trait(clone of ctx)
//!       ── groups[]   -> walk_group(clone of ctx)
//! ```
//!
//! Every node works on its own clone of the context it inherited, so a
//! trait's overrides never reach its siblings and a nested group's defaults
//! never reach its parent.

use futures::future::BoxFuture;
use sqlx::SqliteConnection;
use tracing::debug;

use super::committer::{commit_trait, CommitOutcome};
use crate::diagnostics::Diagnostics;
use crate::document::{EntityNode, GroupNode, NodePath, TraitNode};
use crate::error::{Fatal, ResolveError, WalkResult};
use crate::models::{DefaultContext, TraitRow};
use crate::resolve::{get_or_create_entity, merge_overrides, DateScope};

/// Everything a walk produced, whether or not it ran to completion.
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    pub diagnostics: Diagnostics,
    pub created_trait_ids: Vec<i64>,
    pub created_covariate_ids: Vec<i64>,
    pub entities_created: usize,
}

/// Walks one submission's tree on one connection.
pub struct GroupWalker {
    user_id: i64,
    report: WalkReport,
}

impl GroupWalker {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            report: WalkReport::default(),
        }
    }

    /// Hand back what was accumulated.
    pub fn finish(self) -> WalkReport {
        self.report
    }

    /// Process a group: its entity, its defaults, its traits, then its
    /// nested groups.
    pub fn walk_group<'a>(
        &'a mut self,
        conn: &'a mut SqliteConnection,
        node: &'a GroupNode,
        inherited: DefaultContext,
        path: NodePath,
    ) -> BoxFuture<'a, WalkResult<()>> {
        Box::pin(async move {
            let mut ctx = inherited;

            if let Some(entity) = &node.entity {
                let id = self.resolve_entity(conn, entity, &path.child("entity")).await?;
                ctx.entity_id = Some(id);
            }

            if let Some(defaults) = &node.defaults {
                let scope = DateScope::Defaults {
                    descendants_specify_site: node.descendants_specify_site(),
                };
                ctx = merge_overrides(
                    conn,
                    &ctx,
                    &defaults.overrides,
                    scope,
                    &path.child("defaults"),
                    &mut self.report.diagnostics,
                )
                .await?;
            }

            for (index, item) in node.traits.iter().enumerate() {
                self.visit_trait(conn, item, &ctx, &path.item("traits", index))
                    .await?;
            }

            for (index, group) in node.groups.iter().enumerate() {
                self.walk_group(conn, group, ctx.clone(), path.item("groups", index))
                    .await?;
            }

            Ok(())
        })
    }

    async fn visit_trait(
        &mut self,
        conn: &mut SqliteConnection,
        node: &TraitNode,
        inherited: &DefaultContext,
        path: &NodePath,
    ) -> WalkResult<()> {
        let mut ctx = inherited.clone();

        // An entity supplied by an ancestor takes precedence over the trait's own.
        if let (Some(entity), None) = (&node.entity, ctx.entity_id) {
            let id = self.resolve_entity(conn, entity, &path.child("entity")).await?;
            ctx.entity_id = Some(id);
        }

        let lookups_before = self.report.diagnostics.errors.lookup.len();
        let ctx = merge_overrides(
            conn,
            &ctx,
            &node.overrides,
            DateScope::Trait,
            path,
            &mut self.report.diagnostics,
        )
        .await?;
        let references_resolved = self.report.diagnostics.errors.lookup.len() == lookups_before;

        let row = TraitRow::from_context(
            &ctx,
            node.mean,
            node.stat.clone(),
            node.notes.as_deref(),
            self.user_id,
        );

        let outcome = commit_trait(
            conn,
            &row,
            &node.covariates,
            references_resolved,
            path,
            &mut self.report.diagnostics,
        )
        .await?;

        if let CommitOutcome::Inserted {
            trait_id,
            covariate_ids,
        } = outcome
        {
            self.report.created_trait_ids.push(trait_id);
            self.report.created_covariate_ids.extend(covariate_ids);
        }
        Ok(())
    }

    async fn resolve_entity(
        &mut self,
        conn: &mut SqliteConnection,
        node: &EntityNode,
        path: &NodePath,
    ) -> WalkResult<i64> {
        let diag = &mut self.report.diagnostics;
        match get_or_create_entity(conn, node).await {
            Ok(resolution) => {
                if resolution.created {
                    self.report.entities_created += 1;
                }
                debug!(entity_id = resolution.id, created = resolution.created, %path, "Entity resolved");
                Ok(resolution.id)
            }
            Err(ResolveError::Lookup(e)) => {
                diag.lookup(path, &e);
                Err(Fatal::Entity {
                    path: path.to_string(),
                    source: e,
                })
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
}
