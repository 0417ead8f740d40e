//! Record mappers
//!
//! A [`Mapper`] binds one record type to its schema, relation descriptors,
//! lifecycle hooks and a [`QueryExecutor`]. Every persistence operation runs
//! through the hook pipeline:
//!
//! - `save`: `saving` -> `creating`/`updating` -> core -> `created`/`updated` -> `saved`
//! - `destroy`: `deleting` -> core -> `deleted`
//! - reads: `fetching` -> core -> `fetched`; pre-hooks may rewrite the query

pub mod builder;
pub mod registry;

pub use builder::MapperBuilder;
pub use registry::MapperRegistry;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::attributes::AttributeStore;
use crate::backends::{InsertOutcome, QueryExecutor};
use crate::config::MapperConfig;
use crate::error::{ModelError, ModelResult};
use crate::hooks::{HookContext, HookOutcome, HookRegistry, Operation};
use crate::loading::EagerLoader;
use crate::query::QueryBuilder;
use crate::record::Record;
use crate::relationships::{Relation, RelationDescriptor};
use crate::schema::Schema;
use crate::value::{Row, Value};

pub(crate) type MapperTable = DashMap<String, Mapper>;

pub(crate) struct MapperInner {
    pub(crate) name: String,
    pub(crate) schema: Arc<Schema>,
    pub(crate) config: Arc<MapperConfig>,
    pub(crate) executor: Arc<dyn QueryExecutor>,
    pub(crate) relations: HashMap<String, RelationDescriptor>,
    pub(crate) hooks: HookRegistry,
    pub(crate) registry: Weak<MapperTable>,
}

/// Cheap, cloneable handle to an immutable mapper definition
#[derive(Clone)]
pub struct Mapper {
    inner: Arc<MapperInner>,
}

impl Mapper {
    pub(crate) fn from_inner(inner: MapperInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn table(&self) -> &str {
        &self.inner.schema.table
    }

    pub fn primary_key(&self) -> &str {
        &self.inner.schema.primary_key
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn config(&self) -> &MapperConfig {
        &self.inner.config
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.inner.executor
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.inner.hooks
    }

    pub fn relation_descriptor(&self, name: &str) -> Option<&RelationDescriptor> {
        self.inner.relations.get(name)
    }

    /// Relation names in alphabetical order
    pub fn relation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.relations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// A fresh query over this mapper's source
    pub fn new_query(&self) -> QueryBuilder {
        QueryBuilder::new(self.table())
    }

    /// Build a record from `data` without schema checks
    ///
    /// With `exists` the data is taken as the stored state (nothing dirty);
    /// otherwise every field counts as a change against an empty baseline.
    pub fn new_instance(&self, data: Row, exists: bool) -> Record {
        let mut attributes = AttributeStore::with_schema(Arc::clone(&self.inner.schema));
        if exists {
            attributes.hydrate(data);
        } else {
            for (field, value) in data {
                attributes.set_unchecked(field, value);
            }
        }
        Record::new(self.clone(), attributes, exists)
    }

    /// Record for a row returned by the executor
    pub fn hydrate(&self, row: Row) -> Record {
        self.new_instance(row, true)
    }

    /// Look up another mapper through the registry this mapper was built in
    pub fn resolve_mapper(&self, name: &str) -> ModelResult<Mapper> {
        if name == self.name() {
            return Ok(self.clone());
        }

        self.inner
            .registry
            .upgrade()
            .and_then(|mappers| mappers.get(name).map(|entry| entry.value().clone()))
            .ok_or_else(|| {
                ModelError::RelationConfiguration(format!(
                    "Mapper '{}' is not registered (referenced from '{}')",
                    name,
                    self.name()
                ))
            })
    }

    /// A fresh, unconstrained instance of a named relation
    pub fn get_relation(&self, name: &str) -> ModelResult<Relation> {
        match self.inner.relations.get(name) {
            Some(descriptor) => Relation::new(self.clone(), descriptor),
            None if self.schema().has_field(name) => Err(ModelError::RelationConfiguration(
                format!("'{}' on '{}' is a field, not a relation", name, self.name()),
            )),
            None => Err(ModelError::RelationConfiguration(format!(
                "'{}' has no relation named '{}'",
                self.name(),
                name
            ))),
        }
    }

    /// Builder for a derived mapper starting from a snapshot of this one
    ///
    /// Hooks registered on the derived builder never run for this mapper.
    pub fn extend(&self, name: &str) -> MapperBuilder {
        MapperBuilder::derived_from(self, name)
    }

    /// Insert or update `record` depending on whether it is already stored
    ///
    /// An insert writes the generated key back into the record; an update
    /// sends only the dirty fields. Both commit the record on success.
    pub async fn save(&self, record: &mut Record) -> ModelResult<HookOutcome> {
        if record.is_destroyed() {
            return Err(ModelError::Relationship(format!(
                "cannot save a destroyed '{}' record",
                self.name()
            )));
        }
        let inserting = !record.exists();
        let ctx = self.enter(Operation::Save, record);

        let result = self
            .hooks()
            .run(Operation::Save.as_str(), &ctx, |ctx| async move {
                if inserting {
                    self.hooks()
                        .run(Operation::Create.as_str(), &ctx, |ctx| self.perform_insert(ctx))
                        .await
                } else {
                    self.hooks()
                        .run(Operation::Update.as_str(), &ctx, |ctx| self.perform_update(ctx))
                        .await
                }
            })
            .await;

        *record = ctx.into_record();
        result
    }

    /// Delete `record` from its source
    ///
    /// The attributes stay readable afterwards; the record is only marked
    /// as destroyed.
    pub async fn destroy(&self, record: &mut Record) -> ModelResult<HookOutcome> {
        let ctx = self.enter(Operation::Delete, record);
        let result = self
            .hooks()
            .run(Operation::Delete.as_str(), &ctx, |ctx| self.perform_delete(ctx))
            .await;

        *record = ctx.into_record();
        result
    }

    /// Build a record from `attributes` (validated) and insert it
    pub async fn create(&self, attributes: Row) -> ModelResult<Record> {
        let mut record = self.new_instance(Row::new(), false);
        record.fill(attributes)?;
        self.save(&mut record).await?;
        Ok(record)
    }

    pub async fn find(&self, id: impl Into<Value>, with: &[&str]) -> ModelResult<Record> {
        let query = self.new_query().where_eq(self.primary_key(), id);
        self.fetch_one(query, with).await
    }

    /// First matching record, or `NotFound`
    pub async fn fetch_one(&self, query: QueryBuilder, with: &[&str]) -> ModelResult<Record> {
        self.fetch_optional(query, with)
            .await?
            .ok_or_else(|| ModelError::NotFound(self.table().to_string()))
    }

    pub async fn fetch_optional(
        &self,
        query: QueryBuilder,
        with: &[&str],
    ) -> ModelResult<Option<Record>> {
        let records = self.run_fetch(query, true).await?;
        match records.into_iter().next() {
            Some(mut record) => {
                self.load(std::slice::from_mut(&mut record), with).await?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub async fn fetch_all(&self, query: QueryBuilder, with: &[&str]) -> ModelResult<Vec<Record>> {
        let mut records = self.run_fetch(query, false).await?;
        self.load(&mut records, with).await?;
        Ok(records)
    }

    pub async fn all(&self, with: &[&str]) -> ModelResult<Vec<Record>> {
        self.fetch_all(self.new_query(), with).await
    }

    /// Eager load relations onto already fetched records
    pub async fn load(&self, records: &mut [Record], relations: &[&str]) -> ModelResult<()> {
        if relations.is_empty() || records.is_empty() {
            return Ok(());
        }
        EagerLoader::new(relations.iter().copied())
            .load(records)
            .await?;
        Ok(())
    }

    /// Move `record` into a hook context, leaving an empty placeholder behind
    fn enter(&self, operation: Operation, record: &mut Record) -> HookContext {
        let placeholder = self.new_instance(Row::new(), false);
        HookContext::new(operation.as_str(), std::mem::replace(record, placeholder))
    }

    async fn perform_insert(&self, ctx: HookContext) -> ModelResult<HookOutcome> {
        let primary_key = self.primary_key().to_string();
        let mut data = ctx.with_record(|record| {
            if self.schema().timestamps {
                let now = timestamp();
                let attributes = record.attributes_mut();
                attributes.set_unchecked(self.config().created_at_column.clone(), now.clone());
                attributes.set_unchecked(self.config().updated_at_column.clone(), now);
            }
            record.attributes().snapshot()
        });
        if data.get(&primary_key).map_or(false, Value::is_null) {
            data.remove(&primary_key);
        }
        let supplied_key = data.get(&primary_key).cloned();

        debug!("Inserting into '{}' ({} columns)", self.table(), data.len());
        let outcome = self.executor().insert(self.table(), data).await?;
        let key = outcome.key(&primary_key).or(supplied_key);

        ctx.with_record(|record| {
            match &outcome {
                InsertOutcome::Row(row) => record.attributes_mut().merge_committed(row.clone()),
                InsertOutcome::GeneratedKey(key) => {
                    record.attributes_mut().set_unchecked(primary_key.clone(), key.clone());
                }
                InsertOutcome::Empty => {}
            }
            record.mark_persisted();
        });

        Ok(HookOutcome::Inserted { key })
    }

    async fn perform_update(&self, ctx: HookContext) -> ModelResult<HookOutcome> {
        let (key, dirty) = ctx.with_record(|record| {
            if record.is_dirty() && self.schema().timestamps {
                record
                    .attributes_mut()
                    .set_unchecked(self.config().updated_at_column.clone(), timestamp());
            }
            (stored_key(self, record), record.attributes().dirty())
        });
        let key = key.ok_or(ModelError::MissingPrimaryKey)?;

        if dirty.is_empty() {
            debug!("Nothing to update on '{}' for key {}", self.table(), key);
            return Ok(HookOutcome::Updated { affected: 0 });
        }

        let query = self.new_query().where_eq(self.primary_key(), key);
        debug!("Updating {} fields: {}", dirty.len(), query);
        let affected = self.executor().update(&query, dirty).await?;
        if affected == 0 && self.config().require_affected_rows {
            return Err(ModelError::NotFound(self.table().to_string()));
        }

        ctx.with_record(Record::mark_persisted);
        Ok(HookOutcome::Updated { affected })
    }

    async fn perform_delete(&self, ctx: HookContext) -> ModelResult<HookOutcome> {
        let key = ctx
            .with_record(|record| stored_key(self, record))
            .ok_or(ModelError::MissingPrimaryKey)?;

        let query = self.new_query().where_eq(self.primary_key(), key);
        debug!("Deleting: {}", query);
        let affected = self.executor().delete(&query).await?;
        if affected == 0 && self.config().require_affected_rows {
            return Err(ModelError::NotFound(self.table().to_string()));
        }

        ctx.with_record(Record::mark_destroyed);
        Ok(HookOutcome::Deleted { affected })
    }

    /// Execute a read through the `fetch` hooks
    async fn run_fetch(&self, query: QueryBuilder, single: bool) -> ModelResult<Vec<Record>> {
        let op = Operation::Fetch.as_str();
        if !self.hooks().has_hooks(op) {
            return self.execute_fetch(&query, single).await;
        }

        let ctx = HookContext::with_query(op, self.new_instance(Row::new(), false), query);
        let mut records = Vec::new();
        let found = &mut records;
        self.hooks()
            .run(op, &ctx, |ctx| async move {
                let query = ctx.query().unwrap_or_else(|| self.new_query());
                let fetched = self.execute_fetch(&query, single).await;
                fetched.map(|records| {
                    let count = records.len();
                    *found = records;
                    HookOutcome::Fetched { count }
                })
            })
            .await?;
        Ok(records)
    }

    async fn execute_fetch(&self, query: &QueryBuilder, single: bool) -> ModelResult<Vec<Record>> {
        debug!("Fetching from '{}': {}", self.name(), query);
        let rows: Vec<Row> = if single {
            self.executor().fetch_one(query).await?.into_iter().collect()
        } else {
            self.executor().fetch_all(query).await?
        };
        Ok(rows.into_iter().map(|row| self.hydrate(row)).collect())
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("name", &self.inner.name)
            .field("table", &self.inner.schema.table)
            .field("primary_key", &self.inner.schema.primary_key)
            .field("relations", &self.relation_names())
            .field("hooks", &self.inner.hooks.hook_count())
            .finish()
    }
}

/// Primary key as of the last commit, so a changed key still targets the stored row
fn stored_key(mapper: &Mapper, record: &Record) -> Option<Value> {
    record
        .attributes()
        .original(mapper.primary_key())
        .filter(|v| !v.is_null())
        .cloned()
}

fn timestamp() -> Value {
    Value::from(chrono::Utc::now().to_rfc3339())
}
