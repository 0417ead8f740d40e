//! Relationships - descriptors and single-use relation instances
//!
//! Descriptors ([`RelationDescriptor`]) are declared on a mapper and never
//! change. [`Relation`] instances are built from them per use and carry the
//! query state. Kind-specific operations live next to the kinds that support
//! them and return a relationship error on any other kind.

pub mod belongs_to;
pub mod has_many;
pub mod metadata;
pub mod pivot;
pub mod relation;

pub use metadata::{
    DirectKeys, MorphConfig, MorphKeys, MorphToKeys, PivotConfig, PivotKeys, RelationDescriptor,
    RelationKind, RelationshipType,
};
pub use pivot::SyncChanges;
pub use relation::{Relation, RelationDictionary, RelationState};
