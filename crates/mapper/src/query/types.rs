//! Query description types - operators, conditions, joins and ordering

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Query operator types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::In => write!(f, "IN"),
            QueryOperator::NotIn => write!(f, "NOT IN"),
            QueryOperator::IsNull => write!(f, "IS NULL"),
            QueryOperator::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// A single `column operator value` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereCondition {
    pub column: String,
    pub operator: QueryOperator,
    pub value: Option<Value>,
    /// Operands for `IN` / `NOT IN`
    pub values: Vec<Value>,
}

impl WhereCondition {
    pub fn new(column: &str, operator: QueryOperator, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value: Some(value.into()),
            values: Vec::new(),
        }
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::new(column, QueryOperator::Equal, value)
    }

    pub fn is_in<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            column: column.to_string(),
            operator: QueryOperator::In,
            value: None,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn null(column: &str) -> Self {
        Self {
            column: column.to_string(),
            operator: QueryOperator::IsNull,
            value: None,
            values: Vec::new(),
        }
    }
}

impl fmt::Display for WhereCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            QueryOperator::IsNull | QueryOperator::IsNotNull => {
                write!(f, "{} {}", self.column, self.operator)
            }
            QueryOperator::In | QueryOperator::NotIn => {
                let list: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} {} ({})", self.column, self.operator, list.join(", "))
            }
            _ => match &self.value {
                Some(value) => write!(f, "{} {} {}", self.column, self.operator, value),
                None => write!(f, "{} {} NULL", self.column, self.operator),
            },
        }
    }
}

/// Entry of a WHERE list; top-level entries are AND-ed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WhereClause {
    Condition(WhereCondition),
    /// Matches when any member matches
    Or(Vec<WhereCondition>),
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhereClause::Condition(condition) => write!(f, "{}", condition),
            WhereClause::Or(group) => {
                let parts: Vec<String> = group.iter().map(|c| c.to_string()).collect();
                write!(f, "({})", parts.join(" OR "))
            }
        }
    }
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Join clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub on_conditions: Vec<(String, String)>, // (left_column, right_column)
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}
