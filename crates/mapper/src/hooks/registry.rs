//! Per-mapper hook registry
//!
//! Hooks are keyed by operation name. Event names (`creating`, `saved`, ...)
//! are accepted wherever an operation name is and resolve to the matching
//! operation and phase.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::context::{Continuation, HookContext, HookOutcome, HookPhase, Operation};
use super::error::HookError;
use crate::error::{ModelError, ModelResult};

pub type SyncPreHook = Arc<dyn Fn(&HookContext) -> Result<(), HookError> + Send + Sync>;
pub type FuturePreHook =
    Arc<dyn Fn(HookContext) -> BoxFuture<'static, Result<(), HookError>> + Send + Sync>;
pub type DeferredPreHook = Arc<dyn Fn(HookContext, Continuation) + Send + Sync>;
pub type SyncPostHook =
    Arc<dyn Fn(&HookContext, &HookOutcome) -> Result<(), HookError> + Send + Sync>;
pub type FuturePostHook =
    Arc<dyn Fn(HookContext, HookOutcome) -> BoxFuture<'static, Result<(), HookError>> + Send + Sync>;

/// A pre-operation hook
#[derive(Clone)]
pub enum PreHook {
    /// Runs to completion before the next hook starts
    Sync(SyncPreHook),
    /// Future-returning hook. A detached hook is spawned and the next hook
    /// starts immediately; an attached one is awaited in place.
    Future { hook: FuturePreHook, detached: bool },
    /// Continuation-passing hook, see [`Continuation`]
    Deferred(DeferredPreHook),
}

impl PreHook {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&HookContext) -> Result<(), HookError> + Send + Sync + 'static,
    {
        PreHook::Sync(Arc::new(f))
    }

    /// Future hook awaited before the next hook starts
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        PreHook::Future {
            hook: Arc::new(move |ctx: HookContext| -> BoxFuture<'static, Result<(), HookError>> {
                Box::pin(f(ctx))
            }),
            detached: false,
        }
    }

    /// Future hook that runs alongside the following hooks
    pub fn detached<F, Fut>(f: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        PreHook::Future {
            hook: Arc::new(move |ctx: HookContext| -> BoxFuture<'static, Result<(), HookError>> {
                Box::pin(f(ctx))
            }),
            detached: true,
        }
    }

    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn(HookContext, Continuation) + Send + Sync + 'static,
    {
        PreHook::Deferred(Arc::new(f))
    }

    pub fn is_async(&self) -> bool {
        match self {
            PreHook::Sync(_) => false,
            PreHook::Future { detached, .. } => *detached,
            PreHook::Deferred(_) => true,
        }
    }
}

impl fmt::Debug for PreHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreHook::Sync(_) => write!(f, "PreHook::Sync"),
            PreHook::Future { detached, .. } => write!(f, "PreHook::Future(detached: {})", detached),
            PreHook::Deferred(_) => write!(f, "PreHook::Deferred"),
        }
    }
}

/// A post-operation hook; post-hooks always run one after another
#[derive(Clone)]
pub enum PostHook {
    Sync(SyncPostHook),
    Future(FuturePostHook),
}

impl PostHook {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&HookContext, &HookOutcome) -> Result<(), HookError> + Send + Sync + 'static,
    {
        PostHook::Sync(Arc::new(f))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(HookContext, HookOutcome) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        PostHook::Future(Arc::new(
            move |ctx: HookContext, outcome: HookOutcome| -> BoxFuture<'static, Result<(), HookError>> {
                Box::pin(f(ctx, outcome))
            },
        ))
    }
}

impl fmt::Debug for PostHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostHook::Sync(_) => write!(f, "PostHook::Sync"),
            PostHook::Future(_) => write!(f, "PostHook::Future"),
        }
    }
}

/// Ordered pre/post hook lists per operation
///
/// Cloning produces an independent snapshot: hooks registered on the clone
/// never show up in the original and vice versa.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    pres: HashMap<String, Vec<PreHook>>,
    posts: HashMap<String, Vec<PostHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-hook for an operation (`create`) or pre event (`creating`)
    pub fn register_pre(&mut self, op: &str, hook: PreHook) -> ModelResult<()> {
        let op = resolve(op, HookPhase::Pre)?;
        tracing::debug!("Registered {:?} for '{}'", hook, op);
        self.pres.entry(op).or_default().push(hook);
        Ok(())
    }

    /// Register a post-hook for an operation (`create`) or post event (`created`)
    pub fn register_post(&mut self, op: &str, hook: PostHook) -> ModelResult<()> {
        let op = resolve(op, HookPhase::Post)?;
        tracing::debug!("Registered {:?} for '{}'", hook, op);
        self.posts.entry(op).or_default().push(hook);
        Ok(())
    }

    pub fn pres(&self, op: &str) -> &[PreHook] {
        self.pres.get(op).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn posts(&self, op: &str) -> &[PostHook] {
        self.posts.get(op).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any hook is registered for an operation
    pub fn has_hooks(&self, op: &str) -> bool {
        !self.pres(op).is_empty() || !self.posts(op).is_empty()
    }

    pub fn hook_count(&self) -> usize {
        self.pres.values().map(Vec::len).sum::<usize>()
            + self.posts.values().map(Vec::len).sum::<usize>()
    }
}

fn resolve(name: &str, phase: HookPhase) -> ModelResult<String> {
    if name.is_empty() {
        return Err(ModelError::Configuration(
            "hook operation name must not be empty".to_string(),
        ));
    }

    match Operation::from_event(name) {
        Some((op, event_phase)) if event_phase == phase => Ok(op.as_str().to_string()),
        Some((op, _)) => Err(ModelError::Configuration(format!(
            "'{}' is a {} event of '{}' and cannot take a {} hook",
            name,
            phase_name(phase.opposite()),
            op,
            phase_name(phase)
        ))),
        None => Ok(name.to_string()),
    }
}

fn phase_name(phase: HookPhase) -> &'static str {
    match phase {
        HookPhase::Pre => "pre",
        HookPhase::Post => "post",
    }
}

impl HookPhase {
    fn opposite(self) -> Self {
        match self {
            HookPhase::Pre => HookPhase::Post,
            HookPhase::Post => HookPhase::Pre,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_resolve_to_operations() {
        let mut registry = HookRegistry::new();
        registry.register_pre("creating", PreHook::sync(|_| Ok(()))).unwrap();
        registry.register_pre("create", PreHook::sync(|_| Ok(()))).unwrap();
        registry
            .register_post("saved", PostHook::sync(|_, _| Ok(())))
            .unwrap();

        assert_eq!(registry.pres("create").len(), 2);
        assert_eq!(registry.posts("save").len(), 1);
        assert!(registry.has_hooks("save"));
        assert!(!registry.has_hooks("delete"));
        assert_eq!(registry.hook_count(), 3);
    }

    #[test]
    fn test_wrong_phase_event_is_rejected() {
        let mut registry = HookRegistry::new();
        let err = registry
            .register_pre("created", PreHook::sync(|_| Ok(())))
            .unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
        assert_eq!(registry.hook_count(), 0);
    }

    #[test]
    fn test_custom_operation_names() {
        let mut registry = HookRegistry::new();
        registry.register_pre("publish", PreHook::sync(|_| Ok(()))).unwrap();
        assert_eq!(registry.pres("publish").len(), 1);
    }

    #[test]
    fn test_clone_is_independent_snapshot() {
        let mut base = HookRegistry::new();
        base.register_pre("create", PreHook::sync(|_| Ok(()))).unwrap();

        let mut derived = base.clone();
        derived
            .register_pre("create", PreHook::detached(|_| async { Ok::<(), HookError>(()) }))
            .unwrap();

        assert_eq!(base.pres("create").len(), 1);
        assert_eq!(derived.pres("create").len(), 2);
        assert!(derived.pres("create")[1].is_async());
    }
}
