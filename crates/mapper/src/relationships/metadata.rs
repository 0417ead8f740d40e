//! Relationship Metadata - immutable relation descriptors
//!
//! A descriptor is built once per relation name when a mapper is defined and
//! shared read-only afterwards. Targets are named by mapper name and resolved
//! through the mapper registry when a relation is instantiated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Pivot parent key of a descriptor not yet bound to a mapper
const DEFAULT_PRIMARY_KEY: &str = "id";

/// Defines the type of relationship between record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    /// One-to-one relationship (hasOne)
    HasOne,
    /// One-to-many relationship (hasMany)
    HasMany,
    /// Many-to-one relationship (belongsTo)
    BelongsTo,
    /// Many-to-many relationship through a pivot source
    ManyToMany,
    /// Polymorphic one-to-one relationship
    MorphOne,
    /// Polymorphic one-to-many relationship
    MorphMany,
    /// Inverse polymorphic relationship
    MorphTo,
    /// Polymorphic many-to-many relationship through a pivot source
    MorphToMany,
}

impl RelationshipType {
    /// Returns true if this relationship type is polymorphic
    pub fn is_polymorphic(self) -> bool {
        matches!(
            self,
            Self::MorphOne | Self::MorphMany | Self::MorphTo | Self::MorphToMany
        )
    }

    /// Returns true if this relationship returns a collection
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            Self::HasMany | Self::ManyToMany | Self::MorphMany | Self::MorphToMany
        )
    }

    /// Returns true if this relationship requires a pivot source
    pub fn requires_pivot(self) -> bool {
        matches!(self, Self::ManyToMany | Self::MorphToMany)
    }
}

/// Pivot source configuration for many-to-many relationships
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotConfig {
    /// The pivot source name
    pub table: String,
    /// Pivot column referencing the parent record
    pub local_key: String,
    /// Pivot column referencing the related record
    pub foreign_key: String,
    /// Additional pivot columns projected onto every related record
    pub additional_columns: Vec<String>,
    /// Maintain created/updated timestamp columns on pivot rows
    pub with_timestamps: bool,
}

impl PivotConfig {
    pub fn new(table: &str, local_key: &str, foreign_key: &str) -> Self {
        Self {
            table: table.to_string(),
            local_key: local_key.to_string(),
            foreign_key: foreign_key.to_string(),
            additional_columns: Vec::new(),
            with_timestamps: false,
        }
    }

    /// Add additional columns to select from the pivot source
    pub fn with_additional_columns(mut self, columns: &[&str]) -> Self {
        self.additional_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Enable timestamp columns on the pivot source
    pub fn with_timestamps(mut self) -> Self {
        self.with_timestamps = true;
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.table.is_empty() {
            return Err(ModelError::Configuration(
                "Pivot table name cannot be empty".to_string(),
            ));
        }

        if self.local_key.is_empty() || self.foreign_key.is_empty() {
            return Err(ModelError::Configuration(
                "Pivot keys cannot be empty".to_string(),
            ));
        }

        if self.local_key == self.foreign_key {
            return Err(ModelError::Configuration(
                "Pivot local key and foreign key must be different".to_string(),
            ));
        }

        Ok(())
    }
}

/// Discriminator configuration for polymorphic relationships
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphConfig {
    /// Value stored in the type column for the owning record type
    pub name: String,
    /// Column that stores the discriminator
    pub type_column: String,
    /// Column that stores the owner's key
    pub id_column: String,
}

impl MorphConfig {
    pub fn new(name: &str, type_column: &str, id_column: &str) -> Self {
        Self {
            name: name.to_string(),
            type_column: type_column.to_string(),
            id_column: id_column.to_string(),
        }
    }

    /// `<morph>_type` / `<morph>_id` columns with the given discriminator value
    pub fn conventional(morph: &str, name: &str) -> Self {
        Self::new(name, &format!("{}_type", morph), &format!("{}_id", morph))
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.name.is_empty() {
            return Err(ModelError::Configuration(
                "Polymorphic relationship name cannot be empty".to_string(),
            ));
        }

        if self.type_column.is_empty() || self.id_column.is_empty() {
            return Err(ModelError::Configuration(
                "Polymorphic type and ID columns cannot be empty".to_string(),
            ));
        }

        if self.type_column == self.id_column {
            return Err(ModelError::Configuration(
                "Polymorphic type column and ID column must be different".to_string(),
            ));
        }

        Ok(())
    }
}

/// Keys of a direct relation: related rows satisfy
/// `target.other_key == parent.local_key`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectKeys {
    pub target: String,
    pub local_key: String,
    pub other_key: String,
}

/// Keys of a relation through a pivot source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotKeys {
    pub target: String,
    pub pivot: PivotConfig,
    /// Parent column referenced by `pivot.local_key`; `None` is the parent
    /// mapper's primary key
    pub parent_key: Option<String>,
    /// Related column referenced by `pivot.foreign_key`; `None` is the target
    /// mapper's primary key
    pub related_key: Option<String>,
    /// Discriminator stored on the pivot source (polymorphic many-to-many)
    pub morph: Option<MorphConfig>,
}

/// Keys of a polymorphic one/many relation; related rows satisfy
/// `target.id_column == parent.local_key AND target.type_column == name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphKeys {
    pub target: String,
    pub local_key: String,
    pub morph: MorphConfig,
}

/// Keys of an inverse polymorphic relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphToKeys {
    pub type_column: String,
    pub id_column: String,
    /// Discriminator value to target mapper name
    pub targets: BTreeMap<String, String>,
}

impl MorphToKeys {
    /// Discriminator value written for a target mapper
    pub fn discriminator_for(&self, mapper_name: &str) -> Option<&str> {
        self.targets
            .iter()
            .find(|(_, target)| target.as_str() == mapper_name)
            .map(|(discriminator, _)| discriminator.as_str())
    }
}

/// Closed set of relation kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelationKind {
    HasOne(DirectKeys),
    HasMany(DirectKeys),
    BelongsTo(DirectKeys),
    BelongsToMany(PivotKeys),
    MorphOne(MorphKeys),
    MorphMany(MorphKeys),
    MorphTo(MorphToKeys),
    MorphToMany(PivotKeys),
}

impl RelationKind {
    pub fn relationship_type(&self) -> RelationshipType {
        match self {
            RelationKind::HasOne(_) => RelationshipType::HasOne,
            RelationKind::HasMany(_) => RelationshipType::HasMany,
            RelationKind::BelongsTo(_) => RelationshipType::BelongsTo,
            RelationKind::BelongsToMany(_) => RelationshipType::ManyToMany,
            RelationKind::MorphOne(_) => RelationshipType::MorphOne,
            RelationKind::MorphMany(_) => RelationshipType::MorphMany,
            RelationKind::MorphTo(_) => RelationshipType::MorphTo,
            RelationKind::MorphToMany(_) => RelationshipType::MorphToMany,
        }
    }

    /// Target mapper name; `None` for `MorphTo`, whose target depends on
    /// each record's discriminator
    pub fn target(&self) -> Option<&str> {
        match self {
            RelationKind::HasOne(keys)
            | RelationKind::HasMany(keys)
            | RelationKind::BelongsTo(keys) => Some(&keys.target),
            RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) => {
                Some(&keys.target)
            }
            RelationKind::MorphOne(keys) | RelationKind::MorphMany(keys) => Some(&keys.target),
            RelationKind::MorphTo(_) => None,
        }
    }

    /// Fill an unset pivot parent key with the owning mapper's primary key
    pub(crate) fn default_parent_key(&mut self, primary_key: &str) {
        if let RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) = self {
            keys.parent_key.get_or_insert_with(|| primary_key.to_string());
        }
    }

    /// Parent-side column whose value joins to the related rows
    pub fn local_key(&self) -> &str {
        match self {
            RelationKind::HasOne(keys)
            | RelationKind::HasMany(keys)
            | RelationKind::BelongsTo(keys) => &keys.local_key,
            RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) => keys
                .parent_key
                .as_deref()
                .unwrap_or(DEFAULT_PRIMARY_KEY),
            RelationKind::MorphOne(keys) | RelationKind::MorphMany(keys) => &keys.local_key,
            RelationKind::MorphTo(keys) => &keys.id_column,
        }
    }
}

/// Relation descriptor: a name bound to a relation kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub name: String,
    pub kind: RelationKind,
}

impl RelationDescriptor {
    /// `target.foreign_key == parent.local_key`, single result
    pub fn has_one(name: &str, target: &str, foreign_key: &str, local_key: &str) -> Self {
        Self::direct(name, target, local_key, foreign_key, RelationKind::HasOne)
    }

    /// `target.foreign_key == parent.local_key`, list result
    pub fn has_many(name: &str, target: &str, foreign_key: &str, local_key: &str) -> Self {
        Self::direct(name, target, local_key, foreign_key, RelationKind::HasMany)
    }

    /// `parent.foreign_key == target.owner_key`, single result
    pub fn belongs_to(name: &str, target: &str, foreign_key: &str, owner_key: &str) -> Self {
        Self::direct(name, target, foreign_key, owner_key, RelationKind::BelongsTo)
    }

    fn direct(
        name: &str,
        target: &str,
        local_key: &str,
        other_key: &str,
        kind: fn(DirectKeys) -> RelationKind,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind: kind(DirectKeys {
                target: target.to_string(),
                local_key: local_key.to_string(),
                other_key: other_key.to_string(),
            }),
        }
    }

    /// Many-to-many through `pivot`, joining on the parent's and target's
    /// primary keys
    pub fn belongs_to_many(name: &str, target: &str, pivot: PivotConfig) -> Self {
        Self {
            name: name.to_string(),
            kind: RelationKind::BelongsToMany(PivotKeys {
                target: target.to_string(),
                pivot,
                parent_key: None,
                related_key: None,
                morph: None,
            }),
        }
    }

    pub fn morph_one(name: &str, target: &str, morph: MorphConfig, local_key: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: RelationKind::MorphOne(MorphKeys {
                target: target.to_string(),
                local_key: local_key.to_string(),
                morph,
            }),
        }
    }

    pub fn morph_many(name: &str, target: &str, morph: MorphConfig, local_key: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: RelationKind::MorphMany(MorphKeys {
                target: target.to_string(),
                local_key: local_key.to_string(),
                morph,
            }),
        }
    }

    /// Inverse polymorphic relation; `targets` maps discriminator values to
    /// mapper names
    pub fn morph_to(name: &str, type_column: &str, id_column: &str, targets: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            kind: RelationKind::MorphTo(MorphToKeys {
                type_column: type_column.to_string(),
                id_column: id_column.to_string(),
                targets: targets
                    .iter()
                    .map(|(d, m)| (d.to_string(), m.to_string()))
                    .collect(),
            }),
        }
    }

    /// Polymorphic many-to-many; `morph.type_column` lives on the pivot and
    /// `morph.id_column` must equal `pivot.local_key`
    pub fn morph_to_many(name: &str, target: &str, pivot: PivotConfig, morph: MorphConfig) -> Self {
        Self {
            name: name.to_string(),
            kind: RelationKind::MorphToMany(PivotKeys {
                target: target.to_string(),
                pivot,
                parent_key: None,
                related_key: None,
                morph: Some(morph),
            }),
        }
    }

    /// Override the parent/related key columns of a pivot relation
    pub fn with_pivot_keys(mut self, parent_key: &str, related_key: &str) -> Self {
        if let RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) = &mut self.kind {
            keys.parent_key = Some(parent_key.to_string());
            keys.related_key = Some(related_key.to_string());
        }
        self
    }

    pub fn relationship_type(&self) -> RelationshipType {
        self.kind.relationship_type()
    }

    /// Validate the descriptor for consistency
    pub fn validate(&self) -> ModelResult<()> {
        if self.name.is_empty() {
            return Err(ModelError::Configuration(
                "Relation name cannot be empty".to_string(),
            ));
        }

        let invalid = |what: &str| {
            Err(ModelError::Configuration(format!(
                "Relation '{}' has an empty {}",
                self.name, what
            )))
        };

        match &self.kind {
            RelationKind::HasOne(keys)
            | RelationKind::HasMany(keys)
            | RelationKind::BelongsTo(keys) => {
                if keys.target.is_empty() {
                    return invalid("target");
                }
                if keys.local_key.is_empty() || keys.other_key.is_empty() {
                    return invalid("key");
                }
            }
            RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) => {
                if keys.target.is_empty() {
                    return invalid("target");
                }
                let blank = |key: &Option<String>| key.as_deref() == Some("");
                if blank(&keys.parent_key) || blank(&keys.related_key) {
                    return invalid("key");
                }
                keys.pivot.validate()?;
                if let Some(morph) = &keys.morph {
                    morph.validate()?;
                    if morph.id_column != keys.pivot.local_key {
                        return Err(ModelError::Configuration(format!(
                            "Relation '{}' stores its morph id in '{}' but the pivot key is '{}'",
                            self.name, morph.id_column, keys.pivot.local_key
                        )));
                    }
                }
            }
            RelationKind::MorphOne(keys) | RelationKind::MorphMany(keys) => {
                if keys.target.is_empty() {
                    return invalid("target");
                }
                if keys.local_key.is_empty() {
                    return invalid("key");
                }
                keys.morph.validate()?;
            }
            RelationKind::MorphTo(keys) => {
                if keys.type_column.is_empty() || keys.id_column.is_empty() {
                    return invalid("key");
                }
                if keys.type_column == keys.id_column {
                    return Err(ModelError::Configuration(
                        "Polymorphic type column and ID column must be different".to_string(),
                    ));
                }
                if keys.targets.is_empty() {
                    return invalid("target table");
                }
                if keys
                    .targets
                    .iter()
                    .any(|(discriminator, target)| discriminator.is_empty() || target.is_empty())
                {
                    return invalid("target table");
                }
            }
        }

        Ok(())
    }
}
