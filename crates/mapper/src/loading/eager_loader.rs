//! Eager loader - batched relation resolution for a set of parent records
//!
//! Each relation name costs one query for the whole parent set, no matter how
//! many parents there are. Inverse polymorphic relations cost one query per
//! distinct discriminator among the parents.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::mapper::Mapper;
use crate::record::Record;
use crate::relationships::{Relation, RelationKind};
use crate::value::key_string;

/// Statistics about an eager loading pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EagerLoadStats {
    /// Number of executor queries issued
    pub query_count: usize,
    /// Related records hydrated
    pub records_loaded: usize,
    /// Relation names processed
    pub relations_loaded: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EagerLoader {
    relations: Vec<String>,
}

impl EagerLoader {
    pub fn new<I, S>(relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut loader = Self::default();
        for name in relations {
            loader = loader.with(name);
        }
        loader
    }

    /// Add a relation name; duplicates are ignored
    pub fn with(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.relations.contains(&name) {
            self.relations.push(name);
        }
        self
    }

    pub fn relations(&self) -> &[String] {
        &self.relations
    }

    /// Resolve every relation name for `parents` and fill their related slots
    ///
    /// Parents of different mappers are loaded per mapper. Every parent ends
    /// up with a slot for every name: its matches, or the relation's default
    /// value.
    pub async fn load(&self, parents: &mut [Record]) -> ModelResult<EagerLoadStats> {
        let mut stats = EagerLoadStats::default();
        if parents.is_empty() {
            return Ok(stats);
        }

        for name in &self.relations {
            if name.contains('.') {
                return Err(ModelError::Relationship(format!(
                    "Nested relation path '{}' cannot be eager loaded",
                    name
                )));
            }

            for (mapper, indices) in group_by_mapper(parents) {
                let relation = mapper.get_relation(name)?;
                if matches!(relation.kind(), RelationKind::MorphTo(_)) {
                    self.load_morph_to(relation, &mapper, parents, &indices, &mut stats)
                        .await?;
                } else {
                    self.load_group(relation, parents, &indices, &mut stats).await?;
                }
            }
            stats.relations_loaded += 1;
        }

        debug!(
            "Eager loaded {} relations for {} parents with {} queries",
            stats.relations_loaded,
            parents.len(),
            stats.query_count
        );
        Ok(stats)
    }

    async fn load_group(
        &self,
        mut relation: Relation,
        parents: &mut [Record],
        indices: &[usize],
        stats: &mut EagerLoadStats,
    ) -> ModelResult<()> {
        relation.apply_eager_constraints(select(parents, indices))?;
        let queried = !relation.empty;
        let results = relation.get_results().await?;
        if queried {
            stats.query_count += 1;
        }
        stats.records_loaded += results.len();

        let dictionary = relation.build_dictionary(results)?;
        relation.match_parents(select_mut(parents, indices), &dictionary);
        Ok(())
    }

    async fn load_morph_to(
        &self,
        relation: Relation,
        mapper: &Mapper,
        parents: &mut [Record],
        indices: &[usize],
        stats: &mut EagerLoadStats,
    ) -> ModelResult<()> {
        let type_column = match relation.kind() {
            RelationKind::MorphTo(keys) => keys.type_column.clone(),
            _ => return Ok(()),
        };

        let mut by_type: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut untyped = Vec::new();
        for &i in indices {
            match parents[i].get(&type_column).and_then(key_string) {
                Some(discriminator) => by_type.entry(discriminator).or_default().push(i),
                None => untyped.push(i),
            }
        }

        for i in untyped {
            parents[i].set_related(relation.name(), relation.default_value());
        }

        for (discriminator, group) in by_type {
            let bound = mapper.get_relation(relation.name())?.for_morph_type(&discriminator)?;
            self.load_group(bound, parents, &group, stats).await?;
        }
        Ok(())
    }
}

/// Parent indices grouped by mapper name, in first-seen order
fn group_by_mapper(parents: &[Record]) -> Vec<(Mapper, Vec<usize>)> {
    let mut groups: Vec<(Mapper, Vec<usize>)> = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match groups
            .iter_mut()
            .find(|(mapper, _)| mapper.name() == parent.mapper().name())
        {
            Some((_, indices)) => indices.push(i),
            None => groups.push((parent.mapper().clone(), vec![i])),
        }
    }
    groups
}

fn select<'a>(parents: &'a [Record], indices: &'a [usize]) -> impl Iterator<Item = &'a Record> {
    indices.iter().map(move |&i| &parents[i])
}

fn select_mut<'a>(
    parents: &'a mut [Record],
    indices: &[usize],
) -> impl Iterator<Item = &'a mut Record> {
    let mut selected = vec![false; parents.len()];
    for &i in indices {
        selected[i] = true;
    }
    parents
        .iter_mut()
        .zip(selected)
        .filter_map(|(parent, keep)| keep.then_some(parent))
}
