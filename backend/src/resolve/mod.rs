//! Resolution of a node's declarations against the reference data.
//!
//! - [`foreign_keys`] - reference sub-elements to row ids
//! - [`entity`] - get-or-create for entity nodes
//! - [`datetime`] - local/UTC date attributes to a canonical UTC timestamp
//! - [`defaults`] - all of the above merged into a new context

pub mod datetime;
pub mod defaults;
pub mod entity;
pub mod foreign_keys;

pub use datetime::{normalize_date, parse_local, parse_offset, parse_utc, DateScope};
pub use defaults::merge_overrides;
pub use entity::{get_or_create_entity, EntityResolution};
pub use foreign_keys::{resolve_foreign_keys, resolve_reference, KeyUpdate, KeyUpdates};
