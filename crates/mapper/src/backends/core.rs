//! Core Query Executor Trait
//!
//! The mapping layer never talks to a database directly. Every read and write
//! goes through a [`QueryExecutor`], which receives assembled query
//! descriptions and returns flat rows.

use async_trait::async_trait;

use crate::error::ModelResult;
use crate::query::QueryBuilder;
use crate::value::{Row, Value};

/// What a backend reports back from an insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The backend generated a primary key
    GeneratedKey(Value),
    /// The backend returned the stored row
    Row(Row),
    /// Nothing to write back (e.g. keyless pivot sources)
    Empty,
}

impl InsertOutcome {
    /// Extract the primary key value, if the backend reported one
    pub fn key(&self, primary_key: &str) -> Option<Value> {
        match self {
            InsertOutcome::GeneratedKey(key) => Some(key.clone()),
            InsertOutcome::Row(row) => row.get(primary_key).cloned(),
            InsertOutcome::Empty => None,
        }
    }
}

/// Narrow interface to the external query backend
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute a query and return the first row, if any
    async fn fetch_one(&self, query: &QueryBuilder) -> ModelResult<Option<Row>>;

    /// Execute a query and return every row
    async fn fetch_all(&self, query: &QueryBuilder) -> ModelResult<Vec<Row>>;

    /// Insert a row into a source
    async fn insert(&self, source: &str, data: Row) -> ModelResult<InsertOutcome>;

    /// Update rows matched by the query and return the affected count
    async fn update(&self, query: &QueryBuilder, data: Row) -> ModelResult<u64>;

    /// Delete rows matched by the query and return the affected count
    async fn delete(&self, query: &QueryBuilder) -> ModelResult<u64>;
}
