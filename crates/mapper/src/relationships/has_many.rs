//! HasOne / HasMany / MorphOne / MorphMany - creating records on the related side

use super::metadata::RelationKind;
use super::relation::Relation;
use crate::error::{ModelError, ModelResult};
use crate::record::Record;
use crate::value::{Row, Value};

impl Relation {
    /// Build and save a related record with its foreign key preset
    pub async fn create(&self, attributes: Row) -> ModelResult<Record> {
        let target = self.target()?.clone();
        let mut record = target.new_instance(Row::new(), false);
        record.fill(attributes)?;
        self.save(&mut record).await?;
        Ok(record)
    }

    /// Set the foreign key (and discriminator) on `record`, then save it
    pub async fn save(&self, record: &mut Record) -> ModelResult<()> {
        self.set_foreign_keys(record)?;
        record.save().await?;
        Ok(())
    }

    /// Several [`Relation::save`] calls in order; stops at the first failure
    pub async fn save_many(&self, records: &mut [Record]) -> ModelResult<()> {
        for record in records.iter_mut() {
            self.save(record).await?;
        }
        Ok(())
    }

    fn set_foreign_keys(&self, record: &mut Record) -> ModelResult<()> {
        let parent_key = self.require_parent_key()?;
        match &self.kind {
            RelationKind::HasOne(keys) | RelationKind::HasMany(keys) => {
                record.set(&keys.other_key, parent_key)?;
            }
            RelationKind::MorphOne(keys) | RelationKind::MorphMany(keys) => {
                record.set(&keys.morph.id_column, parent_key)?;
                record.set(&keys.morph.type_column, Value::from(keys.morph.name.as_str()))?;
            }
            _ => {
                return Err(ModelError::Relationship(format!(
                    "Cannot create records through relation '{}' of type {:?}",
                    self.name,
                    self.relationship_type()
                )))
            }
        }
        Ok(())
    }
}
