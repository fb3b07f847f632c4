//! Domain models for the Traitload ingestion pipeline.
//!
//! - [`ReferenceKind`] - closed set of reference tables a trait can point at
//! - [`ReferenceTable`] - dispatch entry (element, table, match columns)
//! - [`DefaultContext`] - values inherited by a subtree of the document
//! - [`ResolvedDate`] - canonical UTC timestamp with precision codes
//! - [`TraitRow`] / [`CovariateRow`] - rows written by the committer

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Precision Codes
// =============================================================================

/// `dateloc` / `timeloc` value for "unspecified".
pub const LOC_UNSPECIFIED: i32 = 9;

/// `dateloc` value for "exact date known".
pub const DATELOC_EXACT_DATE: i32 = 5;

/// `timeloc` value for "exact time known".
pub const TIMELOC_EXACT_TIME: i32 = 1;

// =============================================================================
// Reference Kinds
// =============================================================================

/// A reference table a trait (or covariate) can be keyed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Site,
    Species,
    Cultivar,
    Citation,
    Treatment,
    Variable,
    Method,
}

/// Dispatch entry for one reference kind.
#[derive(Debug)]
pub struct ReferenceTable {
    /// Element name in the document.
    pub element: &'static str,
    /// Table queried for matches.
    pub table: &'static str,
    /// Columns an exact-match selection may use.
    pub match_columns: &'static [&'static str],
}

static REFERENCE_TABLES: [ReferenceTable; 7] = [
    ReferenceTable {
        element: "site",
        table: "sites",
        match_columns: &["id", "sitename", "city", "state", "country"],
    },
    ReferenceTable {
        element: "species",
        table: "species",
        match_columns: &["id", "scientificname", "genus", "species", "commonname"],
    },
    ReferenceTable {
        element: "cultivar",
        table: "cultivars",
        match_columns: &["id", "name", "ecotype"],
    },
    ReferenceTable {
        element: "citation",
        table: "citations",
        match_columns: &["id", "author", "year", "title", "doi"],
    },
    ReferenceTable {
        element: "treatment",
        table: "treatments",
        match_columns: &["id", "name", "definition", "control"],
    },
    ReferenceTable {
        element: "variable",
        table: "variables",
        match_columns: &["id", "name", "units"],
    },
    ReferenceTable {
        element: "method",
        table: "methods",
        match_columns: &["id", "name", "description"],
    },
];

impl ReferenceKind {
    /// Dispatch entry for this kind.
    pub fn table(self) -> &'static ReferenceTable {
        let index = match self {
            Self::Site => 0,
            Self::Species => 1,
            Self::Cultivar => 2,
            Self::Citation => 3,
            Self::Treatment => 4,
            Self::Variable => 5,
            Self::Method => 6,
        };
        &REFERENCE_TABLES[index]
    }

    /// Element name used in documents and messages.
    pub fn name(self) -> &'static str {
        self.table().element
    }

    /// Whether `column` may appear in an exact-match selection.
    pub fn allows_column(self, column: &str) -> bool {
        self.table().match_columns.contains(&column)
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Resolved Date
// =============================================================================

/// A normalized date with its precision codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedDate {
    pub timestamp: DateTime<Utc>,
    pub dateloc: i32,
    pub timeloc: i32,
}

impl ResolvedDate {
    /// Storage representation, e.g. `2020-05-01T00:00:00Z`.
    pub fn to_storage(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

// =============================================================================
// Default Context
// =============================================================================

/// Values inherited by a subtree of the document.
///
/// Every group and trait works on its own clone: a child merges its overrides
/// into the clone and hands further clones to its descendants, so neither
/// parents nor siblings ever observe the change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultContext {
    pub entity_id: Option<i64>,
    foreign_keys: BTreeMap<ReferenceKind, i64>,
    pub date: Option<ResolvedDate>,
    pub access_level: Option<i32>,
}

impl DefaultContext {
    pub fn get(&self, kind: ReferenceKind) -> Option<i64> {
        self.foreign_keys.get(&kind).copied()
    }

    pub fn set(&mut self, kind: ReferenceKind, id: i64) {
        self.foreign_keys.insert(kind, id);
    }

    pub fn clear(&mut self, kind: ReferenceKind) {
        self.foreign_keys.remove(&kind);
    }
}

// =============================================================================
// Rows
// =============================================================================

/// Statistic summary attached to a trait mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub name: String,
    pub sample_size: i64,
    pub value: f64,
}

/// Statistic names accepted for `stat.name`.
pub const STAT_NAMES: [&str; 7] = ["SD", "SE", "MSE", "95%CI", "LSD", "MSD", "HSD"];

/// A fully resolved trait row, ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitRow {
    pub entity_id: Option<i64>,
    pub site_id: Option<i64>,
    pub specie_id: Option<i64>,
    pub cultivar_id: Option<i64>,
    pub citation_id: Option<i64>,
    pub treatment_id: Option<i64>,
    pub variable_id: Option<i64>,
    pub method_id: Option<i64>,
    pub mean: f64,
    pub stat: Option<Stat>,
    pub notes: String,
    pub date: Option<String>,
    pub dateloc: i32,
    pub timeloc: i32,
    pub access_level: Option<i32>,
    pub user_id: i64,
}

impl TraitRow {
    /// Build the column set from a resolved context and the trait's own values.
    pub fn from_context(
        ctx: &DefaultContext,
        mean: f64,
        stat: Option<Stat>,
        notes: Option<&str>,
        user_id: i64,
    ) -> Self {
        let (date, dateloc, timeloc) = match ctx.date {
            Some(d) => (Some(d.to_storage()), d.dateloc, d.timeloc),
            None => (None, LOC_UNSPECIFIED, LOC_UNSPECIFIED),
        };

        Self {
            entity_id: ctx.entity_id,
            site_id: ctx.get(ReferenceKind::Site),
            specie_id: ctx.get(ReferenceKind::Species),
            cultivar_id: ctx.get(ReferenceKind::Cultivar),
            citation_id: ctx.get(ReferenceKind::Citation),
            treatment_id: ctx.get(ReferenceKind::Treatment),
            variable_id: ctx.get(ReferenceKind::Variable),
            method_id: ctx.get(ReferenceKind::Method),
            mean,
            stat,
            notes: notes.unwrap_or_default().to_string(),
            date,
            dateloc,
            timeloc,
            access_level: ctx.access_level,
            user_id,
        }
    }
}

/// A covariate row tied to an inserted trait.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateRow {
    pub trait_id: i64,
    pub variable_id: i64,
    pub level: f64,
}

/// Optional bounds of a variable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VariableBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl VariableBounds {
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_dispatch_table_matches_kinds() {
        for entry in &REFERENCE_TABLES {
            assert!(entry.match_columns.contains(&"id"), "{} must match on id", entry.element);
        }
        assert_eq!(ReferenceKind::Species.name(), "species");
        assert_eq!(ReferenceKind::Cultivar.table().table, "cultivars");
        assert!(!ReferenceKind::Site.allows_column("sitename; DROP TABLE sites"));
    }

    #[test]
    fn test_context_clone_is_independent() {
        let mut parent = DefaultContext::default();
        parent.set(ReferenceKind::Site, 1);
        parent.set(ReferenceKind::Cultivar, 5);

        let mut child = parent.clone();
        child.set(ReferenceKind::Site, 2);
        child.clear(ReferenceKind::Cultivar);

        assert_eq!(parent.get(ReferenceKind::Site), Some(1));
        assert_eq!(child.get(ReferenceKind::Site), Some(2));
        assert_eq!(parent.get(ReferenceKind::Cultivar), Some(5));
        assert_eq!(child.get(ReferenceKind::Cultivar), None);
    }

    #[test]
    fn test_trait_row_without_date_is_unspecified() {
        let mut ctx = DefaultContext::default();
        ctx.set(ReferenceKind::Variable, 7);
        let row = TraitRow::from_context(&ctx, 1.5, None, None, 3);

        assert_eq!(row.variable_id, Some(7));
        assert_eq!(row.dateloc, LOC_UNSPECIFIED);
        assert_eq!(row.timeloc, LOC_UNSPECIFIED);
        assert_eq!(row.notes, "");
        assert!(row.date.is_none());
    }

    #[test]
    fn test_resolved_date_storage_format() {
        let date = ResolvedDate {
            timestamp: Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 0).unwrap(),
            dateloc: DATELOC_EXACT_DATE,
            timeloc: LOC_UNSPECIFIED,
        };
        assert_eq!(date.to_storage(), "2020-05-01T00:00:00Z");
    }

    #[test]
    fn test_variable_bounds() {
        let bounds = VariableBounds { min: Some(0.0), max: Some(10.0) };
        assert!(bounds.contains(0.0));
        assert!(bounds.contains(10.0));
        assert!(!bounds.contains(10.5));
        assert!(VariableBounds::default().contains(-1e9));
    }
}
