//! Records: one attribute store bound to its mapper, plus loaded relations

use std::collections::HashMap;
use std::fmt;

use serde_json::Map;

use crate::attributes::AttributeStore;
use crate::error::ModelResult;
use crate::hooks::HookOutcome;
use crate::mapper::Mapper;
use crate::relationships::Relation;
use crate::value::{Row, Value};

/// A loaded relation slot
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl Related {
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Related::One(record) => record.as_deref(),
            Related::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> &[Record] {
        match self {
            Related::Many(records) => records,
            Related::One(_) => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Related::One(record) => record.is_none(),
            Related::Many(records) => records.is_empty(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Related::One(Some(record)) => record.to_json(),
            Related::One(None) => Value::Null,
            Related::Many(records) => Value::Array(records.iter().map(Record::to_json).collect()),
        }
    }
}

/// Intermediate-source columns attached to a record loaded through a pivot
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRecord {
    pub source: String,
    pub attributes: Row,
}

impl PivotRecord {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }
}

#[derive(Clone)]
pub struct Record {
    mapper: Mapper,
    attributes: AttributeStore,
    related: HashMap<String, Related>,
    pivot: Option<PivotRecord>,
    exists: bool,
    destroyed: bool,
}

impl Record {
    pub(crate) fn new(mapper: Mapper, attributes: AttributeStore, exists: bool) -> Self {
        Self {
            mapper,
            attributes,
            related: HashMap::new(),
            pivot: None,
            exists,
            destroyed: false,
        }
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeStore {
        &mut self.attributes
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> ModelResult<bool> {
        self.attributes.set(field, value)
    }

    pub fn fill(&mut self, row: Row) -> ModelResult<()> {
        self.attributes.fill(row)
    }

    /// Primary key value, if set and non-null
    pub fn key(&self) -> Option<&Value> {
        self.attributes
            .get(self.mapper.primary_key())
            .filter(|v| !v.is_null())
    }

    /// Whether the record is known to be stored in its source
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn is_dirty(&self) -> bool {
        self.attributes.is_dirty()
    }

    pub fn dirty_fields(&self) -> Vec<String> {
        self.attributes.dirty_fields()
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.exists = true;
        self.attributes.commit();
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.exists = false;
        self.destroyed = true;
    }

    /// A loaded relation; `None` means not loaded, never "empty"
    pub fn related(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.related.contains_key(name)
    }

    pub fn related_one(&self, name: &str) -> Option<&Record> {
        self.related.get(name).and_then(Related::as_one)
    }

    pub fn related_many(&self, name: &str) -> &[Record] {
        self.related.get(name).map(Related::as_many).unwrap_or(&[])
    }

    pub fn set_related(&mut self, name: &str, related: Related) {
        self.related.insert(name.to_string(), related);
    }

    pub fn unset_related(&mut self, name: &str) -> Option<Related> {
        self.related.remove(name)
    }

    pub fn pivot(&self) -> Option<&PivotRecord> {
        self.pivot.as_ref()
    }

    pub(crate) fn set_pivot(&mut self, pivot: PivotRecord) {
        self.pivot = Some(pivot);
    }

    /// Insert or update through the mapper's hooks
    pub async fn save(&mut self) -> ModelResult<HookOutcome> {
        let mapper = self.mapper.clone();
        mapper.save(self).await
    }

    /// Delete through the mapper's hooks; attributes stay readable afterwards
    pub async fn destroy(&mut self) -> ModelResult<HookOutcome> {
        let mapper = self.mapper.clone();
        mapper.destroy(self).await
    }

    /// Eager load relations onto this record
    pub async fn load(&mut self, relations: &[&str]) -> ModelResult<()> {
        let mapper = self.mapper.clone();
        mapper.load(std::slice::from_mut(self), relations).await
    }

    /// A relation already constrained to this record
    pub fn relation(&self, name: &str) -> ModelResult<Relation> {
        let mut relation = self.mapper.get_relation(name)?;
        relation.apply_constraints(self)?;
        Ok(relation)
    }

    /// Attributes plus loaded relations and pivot data as a JSON object
    pub fn to_json(&self) -> Value {
        let mut object: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (name, related) in &self.related {
            object.insert(name.clone(), related.to_json());
        }

        if let Some(pivot) = &self.pivot {
            object.insert(
                "pivot".to_string(),
                Value::Object(
                    pivot
                        .attributes
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
            );
        }

        Value::Object(object)
    }

    #[cfg(test)]
    pub(crate) fn detached_for_tests() -> Self {
        use std::sync::Arc;

        let mapper = crate::mapper::MapperBuilder::new("tests")
            .executor(Arc::new(crate::backends::MemoryExecutor::new()))
            .build()
            .expect("test mapper");
        mapper.new_instance(Row::new(), false)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut related: Vec<&String> = self.related.keys().collect();
        related.sort();
        f.debug_struct("Record")
            .field("mapper", &self.mapper.name())
            .field("attributes", &self.attributes)
            .field("related", &related)
            .field("pivot", &self.pivot)
            .field("exists", &self.exists)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
