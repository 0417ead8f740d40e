//! BelongsTo / MorphTo - writing the owning side's keys

use super::metadata::RelationKind;
use super::relation::Relation;
use crate::error::{ModelError, ModelResult};
use crate::record::{Record, Related};
use crate::value::Value;

impl Relation {
    /// Point `child` at `owner`: copies the owner's key into the child's
    /// foreign key (and discriminator for an inverse polymorphic relation)
    /// and caches the owner as loaded.
    pub fn associate(&self, child: &mut Record, owner: &Record) -> ModelResult<()> {
        match &self.kind {
            RelationKind::BelongsTo(keys) => {
                let key = owner
                    .get(&keys.other_key)
                    .filter(|v| !v.is_null())
                    .cloned()
                    .ok_or(ModelError::MissingPrimaryKey)?;
                child.set(&keys.local_key, key)?;
            }
            RelationKind::MorphTo(keys) => {
                let discriminator = keys
                    .discriminator_for(owner.mapper().name())
                    .ok_or_else(|| {
                        ModelError::RelationConfiguration(format!(
                            "Relation '{}' cannot point at '{}' records",
                            self.name,
                            owner.mapper().name()
                        ))
                    })?
                    .to_string();
                let key = owner.key().cloned().ok_or(ModelError::MissingPrimaryKey)?;
                child.set(&keys.id_column, key)?;
                child.set(&keys.type_column, discriminator)?;
            }
            _ => return Err(self.not_owning("associate")),
        }

        child.set_related(&self.name, Related::One(Some(Box::new(owner.clone()))));
        Ok(())
    }

    /// Point `child` at an owner by key only
    pub fn associate_key(&self, child: &mut Record, key: impl Into<Value>) -> ModelResult<()> {
        match &self.kind {
            RelationKind::BelongsTo(keys) => {
                child.set(&keys.local_key, key)?;
                child.unset_related(&self.name);
                Ok(())
            }
            _ => Err(self.not_owning("associate a bare key with")),
        }
    }

    /// Clear the child's foreign key (and discriminator)
    pub fn dissociate(&self, child: &mut Record) -> ModelResult<()> {
        match &self.kind {
            RelationKind::BelongsTo(keys) => {
                child.set(&keys.local_key, Value::Null)?;
            }
            RelationKind::MorphTo(keys) => {
                child.set(&keys.id_column, Value::Null)?;
                child.set(&keys.type_column, Value::Null)?;
            }
            _ => return Err(self.not_owning("dissociate")),
        }

        child.set_related(&self.name, Related::One(None));
        Ok(())
    }

    fn not_owning(&self, action: &str) -> ModelError {
        ModelError::Relationship(format!(
            "Cannot {} relation '{}' of type {:?}",
            action,
            self.name,
            self.relationship_type()
        ))
    }
}
