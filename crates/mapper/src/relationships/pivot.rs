//! BelongsToMany / MorphToMany - maintaining pivot rows
//!
//! Every operation here writes the pivot source directly through the target
//! mapper's executor. None of them is atomic across several rows: if a later
//! row fails, earlier rows stay written.

use std::collections::HashSet;

use tracing::debug;

use super::metadata::PivotKeys;
use super::relation::Relation;
use crate::error::ModelResult;
use crate::query::QueryBuilder;
use crate::value::{key_string, Row, Value};

/// What a [`Relation::sync`] call changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncChanges {
    pub attached: Vec<Value>,
    pub detached: Vec<Value>,
}

impl SyncChanges {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }
}

impl Relation {
    /// Related keys currently attached to the parent
    pub async fn pivot_ids(&self) -> ModelResult<Vec<Value>> {
        let keys = self.pivot_keys()?;
        let query = self.pivot_query()?;
        let rows = self.target()?.executor().fetch_all(&query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.remove(&keys.pivot.foreign_key))
            .filter(|v| !v.is_null())
            .collect())
    }

    /// Insert one pivot row per related key
    pub async fn attach<I, V>(&self, ids: I) -> ModelResult<usize>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut attached = 0;
        for id in ids {
            self.attach_with(id, Row::new()).await?;
            attached += 1;
        }
        Ok(attached)
    }

    /// Insert a pivot row carrying extra pivot attributes
    pub async fn attach_with(&self, id: impl Into<Value>, attributes: Row) -> ModelResult<()> {
        let keys = self.pivot_keys()?;
        let parent_key = self.require_parent_key()?;

        let mut row = attributes;
        row.insert(keys.pivot.local_key.clone(), parent_key);
        row.insert(keys.pivot.foreign_key.clone(), id.into());
        if let Some(morph) = &keys.morph {
            row.insert(morph.type_column.clone(), Value::from(morph.name.as_str()));
        }
        if keys.pivot.with_timestamps {
            let now = Value::from(chrono::Utc::now().to_rfc3339());
            let config = self.parent.config();
            row.insert(config.created_at_column.clone(), now.clone());
            row.insert(config.updated_at_column.clone(), now);
        }

        debug!("Attaching to '{}' through '{}'", self.name, keys.pivot.table);
        self.target()?.executor().insert(&keys.pivot.table, row).await?;
        Ok(())
    }

    /// Delete the pivot rows for the given related keys
    pub async fn detach<I, V>(&self, ids: I) -> ModelResult<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let keys = self.pivot_keys()?;
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let query = self.pivot_query()?.where_in(&keys.pivot.foreign_key, ids);
        debug!("Detaching from '{}': {}", self.name, query);
        self.target()?.executor().delete(&query).await
    }

    /// Delete every pivot row of the parent
    pub async fn detach_all(&self) -> ModelResult<u64> {
        let query = self.pivot_query()?;
        self.target()?.executor().delete(&query).await
    }

    /// Make the attached keys equal `ids`: detach the keys not requested,
    /// attach the requested keys not yet attached, leave the rest untouched.
    ///
    /// Detaching runs first. A failure while attaching leaves the detach in
    /// place.
    pub async fn sync<I, V>(&self, ids: I) -> ModelResult<SyncChanges>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let current = self.pivot_ids().await?;
        let current_keys: HashSet<String> = current.iter().filter_map(key_string).collect();

        let mut requested_keys = HashSet::new();
        let mut attached = Vec::new();
        for id in ids {
            let id = id.into();
            let Some(key) = key_string(&id) else { continue };
            if requested_keys.insert(key.clone()) && !current_keys.contains(&key) {
                attached.push(id);
            }
        }

        let detached: Vec<Value> = current
            .into_iter()
            .filter(|id| key_string(id).map_or(false, |k| !requested_keys.contains(&k)))
            .collect();

        if !detached.is_empty() {
            self.detach(detached.clone()).await?;
        }
        if !attached.is_empty() {
            self.attach(attached.clone()).await?;
        }

        debug!(
            "Synced '{}': {} attached, {} detached",
            self.name,
            attached.len(),
            detached.len()
        );
        Ok(SyncChanges { attached, detached })
    }

    /// Update extra attributes on one pivot row
    pub async fn update_pivot(&self, id: impl Into<Value>, attributes: Row) -> ModelResult<u64> {
        let keys = self.pivot_keys()?;
        let mut data = attributes;
        if keys.pivot.with_timestamps {
            data.insert(
                self.parent.config().updated_at_column.clone(),
                Value::from(chrono::Utc::now().to_rfc3339()),
            );
        }

        let query = self.pivot_query()?.where_eq(&keys.pivot.foreign_key, id);
        self.target()?.executor().update(&query, data).await
    }

    /// Pivot rows of the constrained parent
    fn pivot_query(&self) -> ModelResult<QueryBuilder> {
        let keys: &PivotKeys = self.pivot_keys()?;
        let parent_key = self.require_parent_key()?;

        let query = QueryBuilder::new(&keys.pivot.table).where_eq(&keys.pivot.local_key, parent_key);
        Ok(match &keys.morph {
            Some(morph) => query.where_eq(&morph.type_column, morph.name.as_str()),
            None => query,
        })
    }
}
