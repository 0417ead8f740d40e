//! Mapper builder
//!
//! Collects a mapper definition and validates it once in [`MapperBuilder::build`].
//! Registration errors (bad hook names, invalid descriptors) are deferred to
//! `build` so definitions can be chained.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::debug;

use super::registry::MapperRegistry;
use super::{Mapper, MapperInner, MapperTable};
use crate::backends::QueryExecutor;
use crate::config::MapperConfig;
use crate::error::{ModelError, ModelResult};
use crate::hooks::{HookRegistry, PostHook, PreHook};
use crate::relationships::RelationDescriptor;
use crate::schema::{FieldDef, Schema};

pub struct MapperBuilder {
    name: String,
    table: Option<String>,
    primary_key: Option<String>,
    fields: Vec<FieldDef>,
    timestamps: bool,
    config: MapperConfig,
    executor: Option<Arc<dyn QueryExecutor>>,
    relations: Vec<RelationDescriptor>,
    hooks: HookRegistry,
    errors: Vec<ModelError>,
    pub(crate) registry: Weak<MapperTable>,
}

impl MapperBuilder {
    /// Start a mapper; the source defaults to the mapper name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            primary_key: None,
            fields: Vec::new(),
            timestamps: false,
            config: MapperConfig::default(),
            executor: None,
            relations: Vec::new(),
            hooks: HookRegistry::new(),
            errors: Vec::new(),
            registry: Weak::new(),
        }
    }

    /// Snapshot of an existing mapper under a new name
    pub(crate) fn derived_from(base: &Mapper, name: &str) -> Self {
        let schema = base.schema();
        let mut relations: Vec<RelationDescriptor> =
            base.inner.relations.values().cloned().collect();
        relations.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            name: name.to_string(),
            table: Some(schema.table.clone()),
            primary_key: Some(schema.primary_key.clone()),
            fields: schema.fields.clone(),
            timestamps: schema.timestamps,
            config: base.config().clone(),
            executor: Some(Arc::clone(base.executor())),
            relations,
            hooks: base.hooks().clone(),
            errors: Vec::new(),
            registry: base.inner.registry.clone(),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = Some(column.to_string());
        self
    }

    /// Take source, key, fields and timestamps from a schema descriptor
    pub fn schema(mut self, schema: Schema) -> Self {
        self.table = Some(schema.table);
        self.primary_key = Some(schema.primary_key);
        self.fields = schema.fields;
        self.timestamps = schema.timestamps;
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    pub fn config(mut self, config: MapperConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Add a relation; a later descriptor with the same name replaces the earlier one
    pub fn relation(mut self, descriptor: RelationDescriptor) -> Self {
        self.relations.retain(|r| r.name != descriptor.name);
        self.relations.push(descriptor);
        self
    }

    /// Register a pre-hook by operation (`create`) or event name (`creating`)
    pub fn before(mut self, op: &str, hook: PreHook) -> Self {
        if let Err(err) = self.hooks.register_pre(op, hook) {
            self.errors.push(err);
        }
        self
    }

    /// Register a post-hook by operation (`create`) or event name (`created`)
    pub fn after(mut self, op: &str, hook: PostHook) -> Self {
        if let Err(err) = self.hooks.register_post(op, hook) {
            self.errors.push(err);
        }
        self
    }

    pub fn build(self) -> ModelResult<Mapper> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        if self.name.is_empty() {
            return Err(ModelError::Configuration(
                "mapper name must not be empty".to_string(),
            ));
        }

        let executor = self.executor.ok_or_else(|| {
            ModelError::Configuration(format!("mapper '{}' has no query executor", self.name))
        })?;

        let mut schema = Schema::new(
            self.table.as_deref().unwrap_or(&self.name),
            self.primary_key
                .as_deref()
                .unwrap_or(&self.config.primary_key),
        );
        schema.fields = self.fields;
        schema.timestamps = self.timestamps;

        let mut relations = HashMap::new();
        for mut descriptor in self.relations {
            descriptor.validate()?;
            descriptor.kind.default_parent_key(&schema.primary_key);
            if schema.has_field(&descriptor.name) {
                return Err(ModelError::RelationConfiguration(format!(
                    "relation '{}' on '{}' shadows a field of the same name",
                    descriptor.name, self.name
                )));
            }
            relations.insert(descriptor.name.clone(), descriptor);
        }

        debug!(
            "Built mapper '{}' over '{}' with {} relations and {} hooks",
            self.name,
            schema.table,
            relations.len(),
            self.hooks.hook_count()
        );

        Ok(Mapper::from_inner(MapperInner {
            name: self.name,
            schema: Arc::new(schema),
            config: Arc::new(self.config),
            executor,
            relations,
            hooks: self.hooks,
            registry: self.registry,
        }))
    }

    /// Build and add to `registry`
    pub fn register(self, registry: &MapperRegistry) -> ModelResult<Mapper> {
        registry.register(self)
    }
}
