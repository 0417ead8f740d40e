//! Query descriptions consumed by the query executor

pub mod builder;
pub mod types;
pub mod where_clause;

pub use builder::QueryBuilder;
pub use types::{JoinClause, JoinType, OrderDirection, QueryOperator, WhereClause, WhereCondition};
