//! # elif-mapper: Record Mapping Core for elif.rs
//!
//! The data-mapping layer underneath the elif.rs ORM: attribute state tracking
//! with dirty-diffing, a declarative relation graph (including pivot and
//! polymorphic relations), batched eager loading, and a lifecycle hook
//! pipeline around persistence operations.
//!
//! Query execution is delegated to a [`QueryExecutor`]; the crate ships an
//! in-memory implementation used by the test suite.

pub mod attributes;
pub mod backends;
pub mod config;
pub mod error;
pub mod hooks;
pub mod loading;
pub mod mapper;
pub mod query;
pub mod record;
pub mod relationships;
pub mod schema;
pub mod value;

// Re-export core types
pub use attributes::*;
pub use backends::{InsertOutcome, MemoryExecutor, QueryExecutor, QueryKind, QueryLogEntry};
pub use config::*;
pub use error::*;
pub use hooks::{
    Continuation, HookContext, HookError, HookOutcome, HookPhase, HookRegistry, Operation,
    PostHook, PreHook,
};
pub use loading::{EagerLoadStats, EagerLoader};
pub use mapper::{Mapper, MapperBuilder, MapperRegistry};
pub use query::{
    JoinClause, JoinType, OrderDirection, QueryBuilder, QueryOperator, WhereClause,
    WhereCondition,
};
pub use record::*;
pub use relationships::{
    DirectKeys, MorphConfig, MorphKeys, MorphToKeys, PivotConfig, PivotKeys, Relation,
    RelationDescriptor, RelationDictionary, RelationKind, RelationState, RelationshipType,
    SyncChanges,
};
pub use schema::*;
pub use value::*;
