//! Query Builder WHERE clause operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::value::Value;

impl QueryBuilder {
    fn push_condition(mut self, condition: WhereCondition) -> Self {
        self.where_clauses.push(WhereClause::Condition(condition));
        self
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.push_condition(WhereCondition::eq(column, value))
    }

    pub fn where_ne<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.push_condition(WhereCondition::new(column, QueryOperator::NotEqual, value))
    }

    pub fn where_gt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.push_condition(WhereCondition::new(column, QueryOperator::GreaterThan, value))
    }

    pub fn where_gte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.push_condition(WhereCondition::new(
            column,
            QueryOperator::GreaterThanOrEqual,
            value,
        ))
    }

    pub fn where_lt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.push_condition(WhereCondition::new(column, QueryOperator::LessThan, value))
    }

    pub fn where_lte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.push_condition(WhereCondition::new(
            column,
            QueryOperator::LessThanOrEqual,
            value,
        ))
    }

    /// Add WHERE condition with LIKE (`%` and `_` wildcards)
    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.push_condition(WhereCondition::new(column, QueryOperator::Like, pattern))
    }

    /// Add WHERE condition with IN
    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_condition(WhereCondition::is_in(column, values))
    }

    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut condition = WhereCondition::is_in(column, values);
        condition.operator = QueryOperator::NotIn;
        self.push_condition(condition)
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push_condition(WhereCondition::null(column))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        let mut condition = WhereCondition::null(column);
        condition.operator = QueryOperator::IsNotNull;
        self.push_condition(condition)
    }

    /// Add a group of conditions of which at least one must hold
    pub fn or_where(mut self, group: Vec<WhereCondition>) -> Self {
        if !group.is_empty() {
            self.where_clauses.push(WhereClause::Or(group));
        }
        self
    }
}
