//! In-memory query executor
//!
//! Evaluates query descriptions against in-process tables. Every call is
//! recorded in a query log so callers can assert how many round-trips an
//! operation cost.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::core::{InsertOutcome, QueryExecutor};
use crate::error::{ModelError, ModelResult};
use crate::query::{JoinType, OrderDirection, QueryBuilder, QueryOperator, WhereClause, WhereCondition};
use crate::value::{key_string, keys_match, Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    FetchOne,
    FetchAll,
    Insert,
    Update,
    Delete,
}

/// One recorded executor call
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLogEntry {
    pub kind: QueryKind,
    pub source: String,
    pub query: Option<QueryBuilder>,
    pub data: Option<Row>,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    key_column: Option<String>,
    rows: Vec<Row>,
    next_id: i64,
}

impl MemoryTable {
    fn bump_next_id(&mut self, key: &Value) {
        if let Some(id) = key.as_i64() {
            if id >= self.next_id {
                self.next_id = id + 1;
            }
        }
    }
}

#[derive(Debug, Default)]
struct FailurePlan {
    kind: Option<QueryKind>,
    message: String,
}

/// A [`QueryExecutor`] over in-process tables
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: Mutex<HashMap<String, MemoryTable>>,
    log: Mutex<Vec<QueryLogEntry>>,
    failure: Mutex<Option<FailurePlan>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with an auto-incrementing integer key
    pub fn create_table(&self, name: &str, key_column: &str) {
        lock(&self.tables).insert(
            name.to_string(),
            MemoryTable {
                key_column: Some(key_column.to_string()),
                rows: Vec::new(),
                next_id: 1,
            },
        );
    }

    /// Create a table without a primary key (pivot sources)
    pub fn create_keyless_table(&self, name: &str) {
        lock(&self.tables).insert(
            name.to_string(),
            MemoryTable {
                key_column: None,
                rows: Vec::new(),
                next_id: 1,
            },
        );
    }

    /// Store rows directly, without logging
    pub fn seed(&self, table: &str, rows: Vec<Row>) -> ModelResult<()> {
        let mut tables = lock(&self.tables);
        let table_data = tables
            .get_mut(table)
            .ok_or_else(|| no_such_table(table))?;
        for row in rows {
            if let Some(key) = table_data.key_column.as_ref().and_then(|k| row.get(k)) {
                let key = key.clone();
                table_data.bump_next_id(&key);
            }
            table_data.rows.push(row);
        }
        Ok(())
    }

    /// Copy of every stored row of a table
    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.tables)
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn query_count(&self) -> usize {
        lock(&self.log).len()
    }

    /// Number of logged calls of one kind
    pub fn count_of(&self, kind: QueryKind) -> usize {
        lock(&self.log).iter().filter(|e| e.kind == kind).count()
    }

    pub fn queries(&self) -> Vec<QueryLogEntry> {
        lock(&self.log).clone()
    }

    pub fn clear_log(&self) {
        lock(&self.log).clear();
    }

    /// Make the next call fail with a database error
    pub fn fail_next(&self, message: &str) {
        *lock(&self.failure) = Some(FailurePlan {
            kind: None,
            message: message.to_string(),
        });
    }

    /// Make the next call of `kind` fail with a database error
    pub fn fail_next_of(&self, kind: QueryKind, message: &str) {
        *lock(&self.failure) = Some(FailurePlan {
            kind: Some(kind),
            message: message.to_string(),
        });
    }

    fn record(
        &self,
        kind: QueryKind,
        source: &str,
        query: Option<&QueryBuilder>,
        data: Option<&Row>,
    ) -> ModelResult<()> {
        match query {
            Some(q) => debug!("memory executor {:?}: {}", kind, q),
            None => debug!("memory executor {:?} into {}", kind, source),
        }

        lock(&self.log).push(QueryLogEntry {
            kind,
            source: source.to_string(),
            query: query.cloned(),
            data: data.cloned(),
        });

        let mut failure = lock(&self.failure);
        let triggered = match failure.as_ref() {
            Some(plan) => plan.kind.map_or(true, |k| k == kind),
            None => false,
        };
        if triggered {
            if let Some(plan) = failure.take() {
                return Err(ModelError::Database(plan.message));
            }
        }
        Ok(())
    }

    fn select(&self, query: &QueryBuilder) -> ModelResult<Vec<Row>> {
        let tables = lock(&self.tables);
        let base = tables
            .get(query.source())
            .ok_or_else(|| no_such_table(query.source()))?;

        let mut rows: Vec<Row> = base
            .rows
            .iter()
            .map(|row| qualify(query.source(), row, None))
            .collect();

        for join in query.joins() {
            let joined = tables
                .get(&join.table)
                .ok_or_else(|| no_such_table(&join.table))?;
            let mut next = Vec::new();
            for row in rows {
                let mut matched = false;
                for candidate in &joined.rows {
                    let combined = qualify(&join.table, candidate, Some(&row));
                    let on = join.on_conditions.iter().all(|(left, right)| {
                        match (combined.get(left), combined.get(right)) {
                            (Some(l), Some(r)) => keys_match(l, r),
                            _ => false,
                        }
                    });
                    if on {
                        matched = true;
                        next.push(combined);
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    next.push(row);
                }
            }
            rows = next;
        }

        rows.retain(|row| query.where_clauses().iter().all(|c| clause_matches(c, row)));

        if !query.order().is_empty() {
            rows.sort_by(|a, b| {
                for (column, direction) in query.order() {
                    let ordering = compare_values(
                        a.get(column).unwrap_or(&Value::Null),
                        b.get(column).unwrap_or(&Value::Null),
                    );
                    let ordering = match direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = query.offset_value().unwrap_or(0);
        let limit = query.limit_count().unwrap_or(usize::MAX);

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(query, &row))
            .collect())
    }

    fn matching_positions(table: &MemoryTable, source: &str, query: &QueryBuilder) -> Vec<usize> {
        table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                let qualified = qualify(source, row, None);
                query
                    .where_clauses()
                    .iter()
                    .all(|c| clause_matches(c, &qualified))
            })
            .map(|(i, _)| i)
            .collect()
    }
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    async fn fetch_one(&self, query: &QueryBuilder) -> ModelResult<Option<Row>> {
        self.record(QueryKind::FetchOne, query.source(), Some(query), None)?;
        let limited = query.clone().limit(1);
        Ok(self.select(&limited)?.into_iter().next())
    }

    async fn fetch_all(&self, query: &QueryBuilder) -> ModelResult<Vec<Row>> {
        self.record(QueryKind::FetchAll, query.source(), Some(query), None)?;
        self.select(query)
    }

    async fn insert(&self, source: &str, data: Row) -> ModelResult<InsertOutcome> {
        self.record(QueryKind::Insert, source, None, Some(&data))?;

        let mut tables = lock(&self.tables);
        let table = tables.get_mut(source).ok_or_else(|| no_such_table(source))?;

        let key_column = match table.key_column.clone() {
            Some(key_column) => key_column,
            None => {
                table.rows.push(data);
                return Ok(InsertOutcome::Empty);
            }
        };

        match data.get(&key_column).filter(|v| !v.is_null()).cloned() {
            Some(key) => {
                if table
                    .rows
                    .iter()
                    .any(|r| r.get(&key_column).map_or(false, |k| keys_match(k, &key)))
                {
                    return Err(ModelError::Database(format!(
                        "duplicate key {} in '{}'",
                        key, source
                    )));
                }
                table.bump_next_id(&key);
                table.rows.push(data.clone());
                Ok(InsertOutcome::Row(data))
            }
            None => {
                let key = Value::from(table.next_id);
                table.next_id += 1;
                let mut stored = data;
                stored.insert(key_column, key.clone());
                table.rows.push(stored);
                Ok(InsertOutcome::GeneratedKey(key))
            }
        }
    }

    async fn update(&self, query: &QueryBuilder, data: Row) -> ModelResult<u64> {
        self.record(QueryKind::Update, query.source(), Some(query), Some(&data))?;

        let mut tables = lock(&self.tables);
        let source = query.source().to_string();
        let table = tables.get_mut(&source).ok_or_else(|| no_such_table(&source))?;

        let positions = Self::matching_positions(table, &source, query);
        for &i in &positions {
            for (column, value) in &data {
                table.rows[i].insert(column.clone(), value.clone());
            }
        }
        Ok(positions.len() as u64)
    }

    async fn delete(&self, query: &QueryBuilder) -> ModelResult<u64> {
        self.record(QueryKind::Delete, query.source(), Some(query), None)?;

        let mut tables = lock(&self.tables);
        let source = query.source().to_string();
        let table = tables.get_mut(&source).ok_or_else(|| no_such_table(&source))?;

        let positions = Self::matching_positions(table, &source, query);
        for &i in positions.iter().rev() {
            table.rows.remove(i);
        }
        Ok(positions.len() as u64)
    }
}

fn no_such_table(name: &str) -> ModelError {
    ModelError::Database(format!("no such table '{}'", name))
}

/// Expose a stored row under both `table.column` and bare `column` names.
/// Bare names already present in `base` win.
fn qualify(table: &str, row: &Row, base: Option<&Row>) -> Row {
    let mut out = base.cloned().unwrap_or_default();
    for (column, value) in row {
        out.insert(format!("{}.{}", table, column), value.clone());
        out.entry(column.clone()).or_insert_with(|| value.clone());
    }
    out
}

fn project(query: &QueryBuilder, row: &Row) -> Row {
    let fields = query.select_fields();
    if fields.is_empty() {
        return table_columns(query.source(), row);
    }

    let mut out = Row::new();
    for field in fields {
        if let Some(table) = field.strip_suffix(".*") {
            out.extend(table_columns(table, row));
            continue;
        }

        let (column, alias) = split_alias(field);
        let name = alias.unwrap_or_else(|| match column.rsplit_once('.') {
            Some((_, bare)) => bare,
            None => column,
        });
        let value = row.get(column).cloned().unwrap_or(Value::Null);
        out.insert(name.to_string(), value);
    }
    out
}

fn table_columns(table: &str, row: &Row) -> Row {
    let prefix = format!("{}.", table);
    row.iter()
        .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|c| (c.to_string(), v.clone())))
        .collect()
}

fn split_alias(field: &str) -> (&str, Option<&str>) {
    let lower = field.to_ascii_lowercase();
    match lower.find(" as ") {
        Some(pos) => (field[..pos].trim(), Some(field[pos + 4..].trim())),
        None => (field.trim(), None),
    }
}

fn clause_matches(clause: &WhereClause, row: &Row) -> bool {
    match clause {
        WhereClause::Condition(condition) => condition_matches(condition, row),
        WhereClause::Or(group) => group.iter().any(|c| condition_matches(c, row)),
    }
}

fn condition_matches(condition: &WhereCondition, row: &Row) -> bool {
    let actual = row.get(&condition.column).unwrap_or(&Value::Null);

    match condition.operator {
        QueryOperator::IsNull => actual.is_null(),
        QueryOperator::IsNotNull => !actual.is_null(),
        QueryOperator::In => condition.values.iter().any(|v| keys_match(actual, v)),
        QueryOperator::NotIn => {
            !actual.is_null() && !condition.values.iter().any(|v| keys_match(actual, v))
        }
        operator => {
            let expected = match &condition.value {
                Some(v) if !v.is_null() && !actual.is_null() => v,
                _ => return false,
            };
            match operator {
                QueryOperator::Equal => keys_match(actual, expected),
                QueryOperator::NotEqual => !keys_match(actual, expected),
                QueryOperator::GreaterThan => compare_values(actual, expected) == Ordering::Greater,
                QueryOperator::GreaterThanOrEqual => {
                    compare_values(actual, expected) != Ordering::Less
                }
                QueryOperator::LessThan => compare_values(actual, expected) == Ordering::Less,
                QueryOperator::LessThanOrEqual => {
                    compare_values(actual, expected) != Ordering::Greater
                }
                QueryOperator::Like => match (actual.as_str(), expected.as_str()) {
                    (Some(text), Some(pattern)) => like(text, pattern),
                    _ => false,
                },
                _ => false,
            }
        }
    }
}

/// Total order used for sorting: null first, then numbers, then by key text
fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(0.0);
            let b = b.as_f64().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        _ => key_string(left).cmp(&key_string(right)),
    }
}

/// SQL LIKE with `%` (any run) and `_` (any single char)
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::row;
    use serde_json::json;

    fn executor() -> MemoryExecutor {
        let executor = MemoryExecutor::new();
        executor.create_table("users", "id");
        executor.create_table("posts", "id");
        executor.create_keyless_table("post_tag");
        executor
            .seed(
                "users",
                vec![
                    row([("id", json!(1)), ("name", json!("Ada"))]),
                    row([("id", json!(2)), ("name", json!("Grace"))]),
                    row([("id", json!(3)), ("name", Value::Null)]),
                ],
            )
            .unwrap();
        executor
            .seed(
                "post_tag",
                vec![
                    row([("post_id", json!(10)), ("tag_id", json!(1)), ("note", json!("x"))]),
                    row([("post_id", json!(11)), ("tag_id", json!(1)), ("note", json!("y"))]),
                ],
            )
            .unwrap();
        executor
    }

    #[tokio::test]
    async fn test_generated_keys_continue_after_seeded_rows() {
        let executor = executor();
        let outcome = executor
            .insert("users", row([("name", "Linus")]))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::GeneratedKey(json!(4)));
        assert_eq!(outcome.key("id"), Some(json!(4)));
    }

    #[tokio::test]
    async fn test_explicit_key_returns_row_and_rejects_duplicates() {
        let executor = executor();
        let outcome = executor
            .insert("users", row([("id", json!(9)), ("name", json!("Bjarne"))]))
            .await
            .unwrap();
        assert_eq!(outcome.key("id"), Some(json!(9)));

        let err = executor
            .insert("users", row([("id", json!(9))]))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Database(_)));
    }

    #[tokio::test]
    async fn test_keyless_insert() {
        let executor = executor();
        let outcome = executor
            .insert("post_tag", row([("post_id", 12), ("tag_id", 2)]))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Empty);
        assert_eq!(executor.rows("post_tag").len(), 3);
    }

    #[tokio::test]
    async fn test_where_in_null_and_or_groups() {
        let executor = executor();

        let rows = executor
            .fetch_all(&QueryBuilder::new("users").where_in("id", vec!["1", "3"]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let rows = executor
            .fetch_all(&QueryBuilder::new("users").where_null("name"))
            .await
            .unwrap();
        assert_eq!(rows, vec![row([("id", json!(3)), ("name", Value::Null)])]);

        let rows = executor
            .fetch_all(&QueryBuilder::new("users").or_where(vec![
                WhereCondition::eq("name", "Ada"),
                WhereCondition::eq("id", 2),
            ]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_order_limit_offset() {
        let executor = executor();
        let rows = executor
            .fetch_all(
                &QueryBuilder::new("users")
                    .order_by_desc("id")
                    .offset(1)
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(rows[0].get("id"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_join_with_aliased_projection() {
        let executor = executor();
        executor
            .seed("posts", vec![row([("id", json!(10)), ("title", json!("Hello"))])])
            .unwrap();

        let rows = executor
            .fetch_all(
                &QueryBuilder::new("posts")
                    .select(&["posts.*", "post_tag.tag_id as _pivot_tag_id", "post_tag.note as _pivot_note"])
                    .join("post_tag", "posts.id", "post_tag.post_id")
                    .where_in("post_tag.tag_id", vec![1]),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("title"), Some(&json!("Hello")));
        assert_eq!(rows[0].get("_pivot_tag_id"), Some(&json!(1)));
        assert_eq!(rows[0].get("_pivot_note"), Some(&json!("x")));
    }

    #[tokio::test]
    async fn test_update_and_delete_report_affected_rows() {
        let executor = executor();

        let affected = executor
            .update(&QueryBuilder::new("users").where_eq("id", 1), row([("name", "Ada L.")]))
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let affected = executor
            .delete(&QueryBuilder::new("post_tag").where_eq("tag_id", 1))
            .await
            .unwrap();
        assert_eq!(affected, 2);
        assert!(executor.rows("post_tag").is_empty());

        let affected = executor
            .delete(&QueryBuilder::new("users").where_eq("id", 99))
            .await
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn test_like_patterns() {
        assert!(like("Grace Hopper", "Grace%"));
        assert!(like("Grace Hopper", "%Hop%"));
        assert!(like("Ada", "A_a"));
        assert!(!like("Ada", "A_"));
        assert!(like("", "%"));
    }

    #[tokio::test]
    async fn test_failure_injection_and_log() {
        let executor = executor();
        executor.fail_next_of(QueryKind::Insert, "disk full");

        assert!(executor
            .fetch_all(&QueryBuilder::new("users"))
            .await
            .is_ok());
        let err = executor
            .insert("users", row([("name", "x")]))
            .await
            .unwrap_err();
        assert_eq!(err, ModelError::Database("disk full".to_string()));

        assert_eq!(executor.query_count(), 2);
        assert_eq!(executor.count_of(QueryKind::Insert), 1);
        executor.clear_log();
        assert_eq!(executor.query_count(), 0);
    }
}
