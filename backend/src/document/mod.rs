//! Typed view of a trait-data-set document, plus the annotations written back
//! into it.
//!
//! The walker reads the typed nodes and never touches the caller's JSON
//! directly. Every failure is collected as an [`Annotation`] addressed by a
//! JSON Pointer, and [`Annotations::apply`] attaches them to the original
//! value once the walk is over.
//!
//! ```text
//! {                                   <- group (root)
//!   "entity":   { "name": "plot 7" },
//!   "defaults": { "site": {...}, "utc_datetime": "2020-05-01" },
//!   "traits":   [ { "mean": 1.2, "variable": {...}, "covariates": [...] } ],
//!   "groups":   [ { ...nested group... } ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::Stat;

/// Attribute set of a reference element, matched column by column.
pub type Attributes = BTreeMap<String, Value>;

// =============================================================================
// Nodes
// =============================================================================

/// A group of traits sharing defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupNode {
    #[serde(default)]
    pub entity: Option<EntityNode>,
    #[serde(default)]
    pub defaults: Option<DefaultsNode>,
    #[serde(default)]
    pub traits: Vec<TraitNode>,
    #[serde(default)]
    pub groups: Vec<GroupNode>,
}

impl GroupNode {
    /// Whether any trait or group below this one names its own site.
    pub fn descendants_specify_site(&self) -> bool {
        self.traits.iter().any(|t| t.overrides.references.site.is_some())
            || self.groups.iter().any(|g| {
                g.defaults
                    .as_ref()
                    .is_some_and(|d| d.overrides.references.site.is_some())
                    || g.descendants_specify_site()
            })
    }

    /// Number of trait nodes in this subtree.
    pub fn trait_count(&self) -> usize {
        self.traits.len() + self.groups.iter().map(GroupNode::trait_count).sum::<usize>()
    }
}

/// An observation unit resolved by get-or-create.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityNode {
    pub name: Option<String>,
    pub notes: Option<String>,
}

/// Values a node may set for itself and its descendants.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Overrides {
    #[serde(flatten)]
    pub references: References,
    pub local_datetime: Option<String>,
    pub utc_datetime: Option<String>,
    pub access_level: Option<i32>,
}

/// The `defaults` child of a group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsNode {
    #[serde(flatten)]
    pub overrides: Overrides,
}

/// One measurement.
#[derive(Debug, Clone, Deserialize)]
pub struct TraitNode {
    pub mean: f64,
    pub stat: Option<Stat>,
    pub notes: Option<String>,
    pub entity: Option<EntityNode>,
    #[serde(flatten)]
    pub overrides: Overrides,
    #[serde(default)]
    pub covariates: Vec<CovariateNode>,
}

/// An auxiliary measurement tied to a trait.
#[derive(Debug, Clone, Deserialize)]
pub struct CovariateNode {
    pub variable: Attributes,
    pub level: f64,
}

/// Reference sub-elements of a defaults or trait node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct References {
    pub site: Option<Attributes>,
    pub species: Option<SpeciesRef>,
    pub citation: Option<Attributes>,
    pub treatment: Option<Attributes>,
    pub variable: Option<Attributes>,
    pub method: Option<Attributes>,
}

/// A species reference with its optional nested cultivar.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeciesRef {
    pub cultivar: Option<Attributes>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

// =============================================================================
// Node Paths
// =============================================================================

/// JSON Pointer (RFC 6901) to a node of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodePath(String);

impl NodePath {
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Path to a named member.
    pub fn child(&self, name: &str) -> Self {
        let escaped = name.replace('~', "~0").replace('/', "~1");
        Self(format!("{}/{}", self.0, escaped))
    }

    /// Wrap an already escaped JSON Pointer.
    pub fn from_pointer(pointer: &str) -> Self {
        Self(pointer.to_string())
    }

    /// Path to an array element of a named member.
    pub fn item(&self, name: &str, index: usize) -> Self {
        self.child(name).child(&index.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}

// =============================================================================
// Annotations
// =============================================================================

/// Attribute written onto an implicated node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKey {
    Error,
    ModelValidationErrors,
    DatabaseException,
}

impl AnnotationKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::ModelValidationErrors => "model_validation_errors",
            Self::DatabaseException => "database_exception",
        }
    }
}

/// One pending annotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub path: NodePath,
    pub key: AnnotationKey,
    pub message: String,
}

/// Annotations collected during a submission.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    entries: Vec<Annotation>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: &NodePath, key: AnnotationKey, message: impl Into<String>) {
        self.entries.push(Annotation {
            path: path.clone(),
            key,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Attach every annotation to `document` in place.
    ///
    /// Several messages for the same attribute are joined with `"; "`. Paths
    /// that do not address an object land on the nearest object ancestor.
    pub fn apply(&self, document: &mut Value) {
        for entry in &self.entries {
            let Some(target) = nearest_object(document, entry.path.as_str()) else {
                continue;
            };
            let key = entry.key.as_str();
            let message = match target.get(key).and_then(Value::as_str) {
                Some(existing) => format!("{existing}; {}", entry.message),
                None => entry.message.clone(),
            };
            target.insert(key.to_string(), Value::String(message));
        }
    }
}

fn nearest_object<'a>(document: &'a mut Value, pointer: &str) -> Option<&'a mut Map<String, Value>> {
    let mut pointer = pointer.to_string();
    loop {
        let is_object = document.pointer(&pointer).is_some_and(Value::is_object);
        if is_object {
            return document.pointer_mut(&pointer).and_then(Value::as_object_mut);
        }
        let cut = pointer.rfind('/')?;
        pointer.truncate(cut);
    }
}

// =============================================================================
// Tests
// =============================================================================
