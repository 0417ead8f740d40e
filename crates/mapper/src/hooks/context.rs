//! Hook context, continuations and operation outcomes

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use super::error::HookError;
use crate::error::ModelResult;
use crate::query::QueryBuilder;
use crate::record::Record;
use crate::value::Value;

/// Built-in operations routed through the hook pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Save,
    Delete,
    Fetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Pre,
    Post,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Create,
        Operation::Update,
        Operation::Save,
        Operation::Delete,
        Operation::Fetch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Save => "save",
            Operation::Delete => "delete",
            Operation::Fetch => "fetch",
        }
    }

    pub fn pre_event(self) -> &'static str {
        match self {
            Operation::Create => "creating",
            Operation::Update => "updating",
            Operation::Save => "saving",
            Operation::Delete => "deleting",
            Operation::Fetch => "fetching",
        }
    }

    pub fn post_event(self) -> &'static str {
        match self {
            Operation::Create => "created",
            Operation::Update => "updated",
            Operation::Save => "saved",
            Operation::Delete => "deleted",
            Operation::Fetch => "fetched",
        }
    }

    /// Map an event name such as `creating` to its operation and phase
    pub fn from_event(name: &str) -> Option<(Operation, HookPhase)> {
        Self::ALL.iter().find_map(|&op| {
            if op.pre_event() == name {
                Some((op, HookPhase::Pre))
            } else if op.post_event() == name {
                Some((op, HookPhase::Post))
            } else {
                None
            }
        })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a core operation, handed to post-hooks
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    Inserted { key: Option<Value> },
    Updated { affected: u64 },
    Deleted { affected: u64 },
    Fetched { count: usize },
    Completed,
}

impl HookOutcome {
    pub fn affected(&self) -> u64 {
        match self {
            HookOutcome::Inserted { .. } => 1,
            HookOutcome::Updated { affected } | HookOutcome::Deleted { affected } => *affected,
            HookOutcome::Fetched { count } => *count as u64,
            HookOutcome::Completed => 0,
        }
    }
}

struct ContextInner {
    operation: String,
    record: Mutex<Record>,
    query: Mutex<Option<QueryBuilder>>,
}

/// Shared state of one pipeline run
///
/// Every hook of the run sees the same record. There is no coordination
/// between concurrently running hooks beyond the lock around each access;
/// if two of them write the same field the last write wins.
#[derive(Clone)]
pub struct HookContext {
    inner: Arc<ContextInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HookContext {
    pub fn new(operation: &str, record: Record) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                operation: operation.to_string(),
                record: Mutex::new(record),
                query: Mutex::new(None),
            }),
        }
    }

    /// Context for a read; pre-hooks may rewrite the query
    pub fn with_query(operation: &str, record: Record, query: QueryBuilder) -> Self {
        let context = Self::new(operation, record);
        *lock(&context.inner.query) = Some(query);
        context
    }

    pub fn operation(&self) -> &str {
        &self.inner.operation
    }

    /// Run `f` with exclusive access to the context record
    pub fn with_record<R>(&self, f: impl FnOnce(&mut Record) -> R) -> R {
        let mut record = lock(&self.inner.record);
        f(&mut record)
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.with_record(|record| record.get(field).cloned())
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) -> ModelResult<bool> {
        let value = value.into();
        self.with_record(|record| record.set(field, value))
    }

    pub fn query(&self) -> Option<QueryBuilder> {
        lock(&self.inner.query).clone()
    }

    pub fn set_query(&self, query: QueryBuilder) {
        *lock(&self.inner.query) = Some(query);
    }

    /// Take the record back out of the context
    ///
    /// Hooks that kept a clone of the context past the end of the run only
    /// ever observe a copy from then on.
    pub fn into_record(self) -> Record {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner
                .record
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            Err(shared) => lock(&shared.record).clone(),
        }
    }
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("operation", &self.inner.operation)
            .finish()
    }
}

/// Handle given to continuation-style hooks
///
/// `proceed` lets the next hook start while this one keeps working;
/// `complete` reports the hook's final result and implies `proceed`.
/// Dropping the continuation without completing fails the run with
/// [`HookError::Abandoned`].
pub struct Continuation {
    proceed: Option<oneshot::Sender<()>>,
    done: Option<oneshot::Sender<Result<(), HookError>>>,
}

pub(crate) struct ContinuationReceivers {
    pub proceed: oneshot::Receiver<()>,
    pub done: oneshot::Receiver<Result<(), HookError>>,
}

impl Continuation {
    pub(crate) fn channel() -> (Self, ContinuationReceivers) {
        let (proceed_tx, proceed_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        (
            Self {
                proceed: Some(proceed_tx),
                done: Some(done_tx),
            },
            ContinuationReceivers {
                proceed: proceed_rx,
                done: done_rx,
            },
        )
    }

    pub fn proceed(&mut self) {
        if let Some(tx) = self.proceed.take() {
            let _ = tx.send(());
        }
    }

    pub fn complete(mut self, result: Result<(), HookError>) {
        if let Some(tx) = self.done.take() {
            let _ = tx.send(result);
        }
        self.proceed();
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("proceeded", &self.proceed.is_none())
            .field("completed", &self.done.is_none())
            .finish()
    }
}
