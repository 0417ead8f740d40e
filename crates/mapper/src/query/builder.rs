//! Query Builder - the query description handed to a [`QueryExecutor`]
//!
//! [`QueryExecutor`]: crate::backends::QueryExecutor

use std::fmt;

use super::types::*;

/// Assembled query description: source, projection, filters, joins, ordering
/// and paging
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryBuilder {
    pub(crate) source: String,
    pub(crate) select_fields: Vec<String>,
    pub(crate) where_clauses: Vec<WhereClause>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) limit_count: Option<usize>,
    pub(crate) offset_value: Option<usize>,
}

impl QueryBuilder {
    /// Create a query against a source
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Projected columns; empty means every column of the source
    pub fn select_fields(&self) -> &[String] {
        &self.select_fields
    }

    pub fn where_clauses(&self) -> &[WhereClause] {
        &self.where_clauses
    }

    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    pub fn order(&self) -> &[(String, OrderDirection)] {
        &self.order_by
    }

    pub fn limit_count(&self) -> Option<usize> {
        self.limit_count
    }

    pub fn offset_value(&self) -> Option<usize> {
        self.offset_value
    }

    /// Replace the projection
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Append to the projection
    pub fn add_select(mut self, field: &str) -> Self {
        self.select_fields.push(field.to_string());
        self
    }

    pub fn join(mut self, table: &str, left_column: &str, right_column: &str) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Inner,
            table: table.to_string(),
            on_conditions: vec![(left_column.to_string(), right_column.to_string())],
        });
        self
    }

    pub fn left_join(mut self, table: &str, left_column: &str, right_column: &str) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Left,
            table: table.to_string(),
            on_conditions: vec![(left_column.to_string(), right_column.to_string())],
        });
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), OrderDirection::Asc));
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), OrderDirection::Desc));
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.limit_count = Some(count);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset_value = Some(offset);
        self
    }

    /// Whether any top-level condition filters on `column`
    pub fn has_condition_on(&self, column: &str) -> bool {
        self.where_clauses.iter().any(|clause| match clause {
            WhereClause::Condition(c) => c.column == column,
            WhereClause::Or(group) => group.iter().any(|c| c.column == column),
        })
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let projection = if self.select_fields.is_empty() {
            "*".to_string()
        } else {
            self.select_fields.join(", ")
        };
        write!(f, "SELECT {} FROM {}", projection, self.source)?;

        for join in &self.joins {
            let on: Vec<String> = join
                .on_conditions
                .iter()
                .map(|(l, r)| format!("{} = {}", l, r))
                .collect();
            write!(f, " {} {} ON {}", join.join_type, join.table, on.join(" AND "))?;
        }

        if !self.where_clauses.is_empty() {
            let parts: Vec<String> = self.where_clauses.iter().map(|w| w.to_string()).collect();
            write!(f, " WHERE {}", parts.join(" AND "))?;
        }

        if !self.order_by.is_empty() {
            let parts: Vec<String> = self
                .order_by
                .iter()
                .map(|(c, d)| format!("{} {}", c, d))
                .collect();
            write!(f, " ORDER BY {}", parts.join(", "))?;
        }

        if let Some(limit) = self.limit_count {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = self.offset_value {
            write!(f, " OFFSET {}", offset)?;
        }
        Ok(())
    }
}
