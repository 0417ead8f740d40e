//! Attribute Store - field values, last-commit baseline and dirty tracking
//!
//! `original` only holds fields whose current value differs from the value
//! they had at the last [`AttributeStore::commit`]. Setting a field back to its
//! baseline removes it from `original` again, so the dirty set is always the
//! diff against the last commit, never against intermediate values.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ModelResult;
use crate::schema::Schema;
use crate::value::{Row, Value};

/// Notification emitted by an attribute store
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeEvent {
    Changed {
        field: String,
        previous: Option<Value>,
        current: Value,
    },
    Rejected {
        field: String,
        value: Value,
        message: String,
    },
}

/// Receives attribute notifications
pub trait AttributeListener: Send + Sync {
    fn notify(&self, event: &AttributeEvent);
}

#[derive(Clone, Default)]
pub struct AttributeStore {
    current: Row,
    /// Last-commit value of every dirty field; `None` when the field was absent
    original: HashMap<String, Option<Value>>,
    schema: Option<Arc<Schema>>,
    listeners: Vec<Arc<dyn AttributeListener>>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose `set` calls are checked against schema rules
    pub fn with_schema(schema: Arc<Schema>) -> Self {
        Self {
            schema: Some(schema),
            ..Self::default()
        }
    }

    pub fn subscribe(&mut self, listener: Arc<dyn AttributeListener>) {
        self.listeners.push(listener);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.current.get(field)
    }

    pub fn has(&self, field: &str) -> bool {
        self.current.contains_key(field)
    }

    /// Set a field. Returns `Ok(false)` when the value equals the current one.
    ///
    /// A value rejected by the schema leaves the store untouched, fires a
    /// [`AttributeEvent::Rejected`] notification and returns the validation
    /// error.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> ModelResult<bool> {
        let field = field.into();
        let value = value.into();

        if let Some(schema) = &self.schema {
            if let Err(err) = schema.validate(&field, &value) {
                tracing::warn!("Rejected value for '{}.{}': {}", schema.table, field, err);
                self.emit(&AttributeEvent::Rejected {
                    field,
                    value,
                    message: err.to_string(),
                });
                return Err(err);
            }
        }

        Ok(self.apply(field, value))
    }

    /// Set a field without schema checks
    pub(crate) fn set_unchecked(&mut self, field: impl Into<String>, value: Value) -> bool {
        self.apply(field.into(), value)
    }

    fn apply(&mut self, field: String, value: Value) -> bool {
        let previous = self.current.get(&field).cloned();
        if previous.as_ref() == Some(&value) {
            return false;
        }

        match self.original.get(&field) {
            Some(baseline) if baseline.as_ref() == Some(&value) => {
                self.original.remove(&field);
            }
            Some(_) => {}
            None => {
                self.original.insert(field.clone(), previous.clone());
            }
        }

        self.current.insert(field.clone(), value.clone());
        self.emit(&AttributeEvent::Changed {
            field,
            previous,
            current: value,
        });
        true
    }

    /// Set every field of `row`. Rejected fields are skipped; the first
    /// rejection is returned after all other fields have been applied.
    pub fn fill(&mut self, row: Row) -> ModelResult<()> {
        let mut first_error = None;
        for (field, value) in row {
            if let Err(err) = self.set(field, value) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Replace all values with trusted backend data and commit
    pub fn hydrate(&mut self, row: Row) {
        self.current = row;
        self.original.clear();
    }

    /// Merge trusted backend data into the current values and commit
    pub(crate) fn merge_committed(&mut self, row: Row) {
        self.current.extend(row);
        self.original.clear();
    }

    /// Mark the current values as the new baseline
    pub fn commit(&mut self) {
        self.original.clear();
    }

    pub fn is_dirty(&self) -> bool {
        !self.original.is_empty()
    }

    pub fn is_field_dirty(&self, field: &str) -> bool {
        self.original.contains_key(field)
    }

    /// Names of fields that differ from the last commit, sorted
    pub fn dirty_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.original.keys().cloned().collect();
        fields.sort();
        fields
    }

    /// Dirty fields with their current values
    pub fn dirty(&self) -> Row {
        self.original
            .keys()
            .filter_map(|field| {
                self.current
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect()
    }

    /// Value of a field at the last commit
    pub fn original(&self, field: &str) -> Option<&Value> {
        match self.original.get(field) {
            Some(baseline) => baseline.as_ref(),
            None => self.current.get(field),
        }
    }

    /// Restore every dirty field to its last-commit value
    pub fn discard_changes(&mut self) {
        for (field, baseline) in self.original.drain() {
            match baseline {
                Some(value) => {
                    self.current.insert(field, value);
                }
                None => {
                    self.current.remove(&field);
                }
            }
        }
    }

    /// Immutable copy of the current values
    pub fn snapshot(&self) -> Row {
        self.current.clone()
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.current.iter()
    }

    fn emit(&self, event: &AttributeEvent) {
        for listener in &self.listeners {
            listener.notify(event);
        }
    }
}

impl fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeStore")
            .field("current", &self.current)
            .field("original", &self.original)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
