//! Relation instances
//!
//! A [`Relation`] is created from a descriptor for a single use:
//! `Unconstrained -> Constrained -> Resolved`. Constraints are applied either
//! for one parent ([`Relation::apply_constraints`]) or for a batch of parents
//! ([`Relation::apply_eager_constraints`]); resolving an unconstrained
//! relation is an error.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use super::metadata::{PivotKeys, RelationDescriptor, RelationKind, RelationshipType};
use crate::error::{ModelError, ModelResult};
use crate::mapper::Mapper;
use crate::query::QueryBuilder;
use crate::record::{PivotRecord, Record, Related};
use crate::value::{key_string, Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationState {
    Unconstrained,
    Constrained,
    Resolved,
}

/// Related records grouped by normalized join key
pub type RelationDictionary = HashMap<String, Vec<Record>>;

pub struct Relation {
    pub(crate) name: String,
    pub(crate) kind: RelationKind,
    pub(crate) parent: Mapper,
    pub(crate) target: Option<Mapper>,
    pub(crate) state: RelationState,
    pub(crate) query: Option<QueryBuilder>,
    /// Local key value of the single parent this relation was constrained to
    pub(crate) parent_key: Option<Value>,
    /// Discriminator resolved for an inverse polymorphic relation
    pub(crate) morph_type: Option<String>,
    pub(crate) pivot_columns: Vec<String>,
    /// Constraints matched no usable key; resolving yields the default value
    pub(crate) empty: bool,
}

impl Relation {
    /// Instantiate a relation of `parent` from its descriptor
    pub fn new(parent: Mapper, descriptor: &RelationDescriptor) -> ModelResult<Self> {
        let target = match descriptor.kind.target() {
            Some(name) => Some(parent.resolve_mapper(name)?),
            None => None,
        };
        let pivot_columns = match &descriptor.kind {
            RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) => {
                keys.pivot.additional_columns.clone()
            }
            _ => Vec::new(),
        };

        Ok(Self {
            name: descriptor.name.clone(),
            kind: descriptor.kind.clone(),
            parent,
            target,
            state: RelationState::Unconstrained,
            query: None,
            parent_key: None,
            morph_type: None,
            pivot_columns,
            empty: false,
        })
    }

    /// Bind an inverse polymorphic relation to one discriminator value
    pub fn for_morph_type(mut self, discriminator: &str) -> ModelResult<Self> {
        self.bind_morph_type(discriminator)?;
        Ok(self)
    }

    fn bind_morph_type(&mut self, discriminator: &str) -> ModelResult<()> {
        let mapper_name = match &self.kind {
            RelationKind::MorphTo(keys) => keys.targets.get(discriminator).cloned().ok_or_else(|| {
                ModelError::RelationConfiguration(format!(
                    "Relation '{}' has no target for discriminator '{}'",
                    self.name, discriminator
                ))
            })?,
            _ => {
                return Err(ModelError::Relationship(format!(
                    "Relation '{}' is not an inverse polymorphic relation",
                    self.name
                )))
            }
        };
        self.target = Some(self.parent.resolve_mapper(&mapper_name)?);
        self.morph_type = Some(discriminator.to_string());
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &RelationKind {
        &self.kind
    }

    pub fn relationship_type(&self) -> RelationshipType {
        self.kind.relationship_type()
    }

    pub fn state(&self) -> RelationState {
        self.state
    }

    /// Parent-side join column
    pub fn local_key(&self) -> &str {
        self.kind.local_key()
    }

    pub fn is_collection(&self) -> bool {
        self.relationship_type().is_collection()
    }

    /// Target mapper; unresolved for an inverse polymorphic relation until
    /// its discriminator is known
    pub fn target(&self) -> ModelResult<&Mapper> {
        self.target.as_ref().ok_or_else(|| {
            ModelError::Relationship(format!(
                "Relation '{}' has no resolved target",
                self.name
            ))
        })
    }

    pub fn query(&self) -> Option<&QueryBuilder> {
        self.query.as_ref()
    }

    /// Project extra pivot columns into each related record's `pivot`
    pub fn with_pivot(mut self, columns: &[&str]) -> ModelResult<Self> {
        self.pivot_keys()?;
        for column in columns {
            if !self.pivot_columns.iter().any(|c| c == column) {
                self.pivot_columns.push(column.to_string());
            }
        }
        Ok(self)
    }

    /// Add caller constraints to a constrained relation
    pub fn constrain(mut self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> ModelResult<Self> {
        self.expect_state(RelationState::Constrained, "add constraints to")?;
        if let Some(query) = self.query.take() {
            self.query = Some(f(query));
        }
        Ok(self)
    }

    /// Default value for parents without related rows
    pub fn default_value(&self) -> Related {
        if self.is_collection() {
            Related::Many(Vec::new())
        } else {
            Related::One(None)
        }
    }

    /// Constrain to the related rows of one parent
    pub fn apply_constraints(&mut self, parent: &Record) -> ModelResult<()> {
        self.expect_state(RelationState::Unconstrained, "constrain")?;

        if let RelationKind::MorphTo(keys) = &self.kind {
            if self.morph_type.is_none() {
                match parent.get(&keys.type_column).and_then(key_string) {
                    Some(discriminator) => self.bind_morph_type(&discriminator)?,
                    None => {
                        self.empty = true;
                        self.state = RelationState::Constrained;
                        return Ok(());
                    }
                }
            }
        }

        let value = parent
            .get(self.local_key())
            .filter(|v| !v.is_null())
            .cloned();

        match value {
            Some(value) => {
                let column = self.constraint_column()?;
                self.query = Some(self.base_query()?.where_eq(&column, value.clone()));
                self.parent_key = Some(value);
            }
            None => {
                self.query = Some(self.base_query()?);
                self.empty = true;
            }
        }

        self.state = RelationState::Constrained;
        Ok(())
    }

    /// Constrain to the related rows of a batch of parents with a single
    /// `IN` condition over their distinct keys
    pub fn apply_eager_constraints<'a, I>(&mut self, parents: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        self.expect_state(RelationState::Unconstrained, "constrain")?;

        if matches!(self.kind, RelationKind::MorphTo(_)) && self.morph_type.is_none() {
            return Err(ModelError::Relationship(format!(
                "Relation '{}' must be bound to a discriminator before eager loading",
                self.name
            )));
        }

        let local_key = self.local_key().to_string();
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for parent in parents {
            if let Some(value) = parent.get(&local_key) {
                if let Some(normalized) = key_string(value) {
                    if seen.insert(normalized) {
                        keys.push(value.clone());
                    }
                }
            }
        }

        let column = self.constraint_column()?;
        self.empty = keys.is_empty();
        self.query = Some(self.base_query()?.where_in(&column, keys));
        self.state = RelationState::Constrained;
        Ok(())
    }

    /// Execute the constrained query and hydrate the related records
    pub async fn get_results(&mut self) -> ModelResult<Vec<Record>> {
        self.expect_state(RelationState::Constrained, "resolve")?;
        self.state = RelationState::Resolved;

        if self.empty {
            debug!("Relation '{}' has no keys to match, skipping query", self.name);
            return Ok(Vec::new());
        }

        let query = self.final_query()?;
        let target = self.target()?.clone();
        debug!("Resolving relation '{}': {}", self.name, query);
        let rows = target.executor().fetch_all(&query).await?;
        Ok(rows.into_iter().map(|row| self.hydrate(&target, row)).collect())
    }

    /// Resolve to a single record or a list, per cardinality
    pub async fn load(&mut self) -> ModelResult<Related> {
        let results = self.get_results().await?;
        Ok(self.shape(results))
    }

    /// Group resolved records by the key they join on
    pub fn build_dictionary(&self, results: Vec<Record>) -> ModelResult<RelationDictionary> {
        let mut dictionary: RelationDictionary = HashMap::new();
        for record in results {
            if let Some(key) = self.dictionary_key(&record)?.as_ref().and_then(key_string) {
                dictionary.entry(key).or_default().push(record);
            }
        }
        Ok(dictionary)
    }

    /// Assign each parent its matches from `dictionary`, or the default value
    pub fn match_parents<'a, I>(&self, parents: I, dictionary: &RelationDictionary)
    where
        I: IntoIterator<Item = &'a mut Record>,
    {
        let local_key = self.local_key();
        for parent in parents {
            let matched = parent
                .get(local_key)
                .and_then(key_string)
                .and_then(|key| dictionary.get(&key));
            let related = match matched {
                Some(records) => self.shape(records.clone()),
                None => self.default_value(),
            };
            parent.set_related(&self.name, related);
        }
    }

    pub(crate) fn shape(&self, results: Vec<Record>) -> Related {
        if self.is_collection() {
            Related::Many(results)
        } else {
            Related::One(results.into_iter().next().map(Box::new))
        }
    }

    pub(crate) fn expect_state(&self, expected: RelationState, action: &str) -> ModelResult<()> {
        if self.state == expected {
            return Ok(());
        }
        Err(ModelError::Relationship(format!(
            "Cannot {} relation '{}' in state {:?}",
            action, self.name, self.state
        )))
    }

    pub(crate) fn pivot_keys(&self) -> ModelResult<&PivotKeys> {
        match &self.kind {
            RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) => Ok(keys),
            _ => Err(ModelError::Relationship(format!(
                "Relation '{}' does not go through a pivot source",
                self.name
            ))),
        }
    }

    /// Key of the parent this relation was constrained to
    pub(crate) fn require_parent_key(&self) -> ModelResult<Value> {
        self.expect_constrained_once()?;
        self.parent_key.clone().ok_or(ModelError::MissingPrimaryKey)
    }

    fn expect_constrained_once(&self) -> ModelResult<()> {
        if self.state == RelationState::Unconstrained {
            return Err(ModelError::Relationship(format!(
                "Relation '{}' must be constrained to a parent first",
                self.name
            )));
        }
        Ok(())
    }

    /// Related-side column compared against the parent keys
    fn constraint_column(&self) -> ModelResult<String> {
        let column = match &self.kind {
            RelationKind::HasOne(keys)
            | RelationKind::HasMany(keys)
            | RelationKind::BelongsTo(keys) => qualify(self.target()?.table(), &keys.other_key),
            RelationKind::MorphOne(keys) | RelationKind::MorphMany(keys) => {
                qualify(self.target()?.table(), &keys.morph.id_column)
            }
            RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) => {
                qualify(&keys.pivot.table, &keys.pivot.local_key)
            }
            RelationKind::MorphTo(_) => {
                let target = self.target()?;
                qualify(target.table(), target.primary_key())
            }
        };
        Ok(column)
    }

    /// Query over the target with every kind-specific constraint except the
    /// parent key
    fn base_query(&self) -> ModelResult<QueryBuilder> {
        let target = self.target()?;
        let query = target.new_query();

        let query = match &self.kind {
            RelationKind::MorphOne(keys) | RelationKind::MorphMany(keys) => query.where_eq(
                &qualify(target.table(), &keys.morph.type_column),
                keys.morph.name.as_str(),
            ),
            RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) => {
                let query = query.join(
                    &keys.pivot.table,
                    &qualify(
                        target.table(),
                        keys.related_key.as_deref().unwrap_or(target.primary_key()),
                    ),
                    &qualify(&keys.pivot.table, &keys.pivot.foreign_key),
                );
                match &keys.morph {
                    Some(morph) => query.where_eq(
                        &qualify(&keys.pivot.table, &morph.type_column),
                        morph.name.as_str(),
                    ),
                    None => query,
                }
            }
            RelationKind::HasOne(_)
            | RelationKind::HasMany(_)
            | RelationKind::BelongsTo(_)
            | RelationKind::MorphTo(_) => query,
        };
        Ok(query)
    }

    /// The constrained query with its projection
    fn final_query(&self) -> ModelResult<QueryBuilder> {
        let query = self.query.clone().ok_or_else(|| {
            ModelError::Relationship(format!("Relation '{}' has no query", self.name))
        })?;

        let keys = match &self.kind {
            RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) => keys,
            _ => return Ok(query),
        };

        let target = self.target()?;
        let config = target.config();
        let all_columns = format!("{}.*", target.table());
        let mut query = query.select(&[all_columns.as_str()]);
        for column in self.pivot_projection(keys) {
            query = query.add_select(&format!(
                "{} as {}",
                qualify(&keys.pivot.table, &column),
                config.pivot_alias(&column)
            ));
        }
        Ok(query)
    }

    fn pivot_projection(&self, keys: &PivotKeys) -> Vec<String> {
        let mut columns = vec![keys.pivot.local_key.clone(), keys.pivot.foreign_key.clone()];
        if let Some(morph) = &keys.morph {
            columns.push(morph.type_column.clone());
        }
        columns.extend(self.pivot_columns.iter().cloned());
        if keys.pivot.with_timestamps {
            let config = self.parent.config();
            columns.push(config.created_at_column.clone());
            columns.push(config.updated_at_column.clone());
        }

        let mut seen = HashSet::new();
        columns.retain(|c| seen.insert(c.clone()));
        columns
    }

    fn hydrate(&self, target: &Mapper, row: Row) -> Record {
        let keys = match &self.kind {
            RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) => keys,
            _ => return target.hydrate(row),
        };

        let prefix = target.config().pivot_prefix.clone();
        let mut base = Row::new();
        let mut pivot = Row::new();
        for (column, value) in row {
            match column.strip_prefix(&prefix) {
                Some(pivot_column) => {
                    pivot.insert(pivot_column.to_string(), value);
                }
                None => {
                    base.insert(column, value);
                }
            }
        }

        let mut record = target.hydrate(base);
        record.set_pivot(PivotRecord {
            source: keys.pivot.table.clone(),
            attributes: pivot,
        });
        record
    }

    fn dictionary_key(&self, record: &Record) -> ModelResult<Option<Value>> {
        let value = match &self.kind {
            RelationKind::HasOne(keys)
            | RelationKind::HasMany(keys)
            | RelationKind::BelongsTo(keys) => record.get(&keys.other_key),
            RelationKind::MorphOne(keys) | RelationKind::MorphMany(keys) => {
                record.get(&keys.morph.id_column)
            }
            RelationKind::BelongsToMany(keys) | RelationKind::MorphToMany(keys) => record
                .pivot()
                .and_then(|pivot| pivot.get(&keys.pivot.local_key)),
            RelationKind::MorphTo(_) => record.get(self.target()?.primary_key()),
        };
        Ok(value.cloned())
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("type", &self.relationship_type())
            .field("parent", &self.parent.name())
            .field("target", &self.target.as_ref().map(Mapper::name))
            .field("state", &self.state)
            .field("morph_type", &self.morph_type)
            .finish()
    }
}

pub(crate) fn qualify(table: &str, column: &str) -> String {
    format!("{}.{}", table, column)
}
