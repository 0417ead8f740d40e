//! Hook pipeline: pre-hooks, core operation, post-hooks

use std::future::Future;

use futures::future::BoxFuture;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::context::{Continuation, HookContext, HookOutcome};
use super::error::HookError;
use super::registry::{HookRegistry, PostHook, PreHook};
use crate::error::ModelResult;

impl HookRegistry {
    /// Run an operation through its hooks
    ///
    /// Pre-hooks start in registration order. The core runs once, after every
    /// started pre-hook (including detached ones) has finished without error.
    /// Post-hooks then run in order with the core's outcome. A post-hook
    /// failure is returned to the caller but the core's effects stay in place.
    pub async fn run<F, Fut>(&self, op: &str, ctx: &HookContext, core: F) -> ModelResult<HookOutcome>
    where
        F: FnOnce(HookContext) -> Fut,
        Fut: Future<Output = ModelResult<HookOutcome>>,
    {
        if !self.has_hooks(op) {
            return core(ctx.clone()).await;
        }

        self.run_pre(op, ctx).await?;
        let outcome = core(ctx.clone()).await?;
        if let Err(err) = self.run_post(op, ctx, &outcome).await {
            warn!("Post-hook for '{}' failed after the operation completed: {}", op, err);
            return Err(err.into());
        }
        Ok(outcome)
    }

    /// Run the pre-hooks of an operation and join every started hook
    ///
    /// Once a hook fails no further hooks are started. Hooks that are already
    /// running are still awaited, and the first error observed is returned.
    pub async fn run_pre(&self, op: &str, ctx: &HookContext) -> Result<(), HookError> {
        let hooks = self.pres(op);
        if hooks.is_empty() {
            return Ok(());
        }

        debug!("Running {} pre-hooks for '{}'", hooks.len(), op);
        let mut outstanding: JoinSet<Result<(), HookError>> = JoinSet::new();
        let mut first_error: Option<HookError> = None;

        for hook in hooks {
            let started = match hook {
                PreHook::Sync(hook) => hook(ctx),
                PreHook::Future {
                    hook,
                    detached: false,
                } => hook(ctx.clone()).await,
                PreHook::Future {
                    hook,
                    detached: true,
                } => {
                    outstanding.spawn(hook(ctx.clone()));
                    Ok(())
                }
                PreHook::Deferred(hook) => {
                    start_deferred(op, &**hook, ctx, &mut outstanding).await
                }
            };

            if let Err(err) = started {
                first_error = Some(err);
                break;
            }
        }

        debug!("Joining {} outstanding async pre-hooks for '{}'", outstanding.len(), op);
        while let Some(joined) = outstanding.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_error) if join_error.is_panic() => Err(HookError::panicked(op)),
                Err(_) => Err(HookError::abandoned(op)),
            };
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => {
                debug!("Pre-hooks for '{}' aborted the operation: {}", op, err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Run the post-hooks of an operation in order, stopping at the first failure
    pub async fn run_post(
        &self,
        op: &str,
        ctx: &HookContext,
        outcome: &HookOutcome,
    ) -> Result<(), HookError> {
        for hook in self.posts(op) {
            match hook {
                PostHook::Sync(hook) => hook(ctx, outcome)?,
                PostHook::Future(hook) => hook(ctx.clone(), outcome.clone()).await?,
            }
        }
        Ok(())
    }
}

/// Start a continuation hook and wait until it lets the next hook start
async fn start_deferred(
    op: &str,
    hook: &(dyn Fn(HookContext, Continuation) + Send + Sync),
    ctx: &HookContext,
    outstanding: &mut JoinSet<Result<(), HookError>>,
) -> Result<(), HookError> {
    let (continuation, mut receivers) = Continuation::channel();
    hook(ctx.clone(), continuation);

    // A dropped continuation also releases the next hook; the missing
    // completion is reported below.
    let _ = (&mut receivers.proceed).await;

    match receivers.done.try_recv() {
        Ok(result) => result,
        Err(TryRecvError::Closed) => Err(HookError::abandoned(op)),
        Err(TryRecvError::Empty) => {
            let op = op.to_string();
            let done = receivers.done;
            let waiter: BoxFuture<'static, Result<(), HookError>> = Box::pin(async move {
                match done.await {
                    Ok(result) => result,
                    Err(_) => Err(HookError::abandoned(&op)),
                }
            });
            outstanding.spawn(waiter);
            Ok(())
        }
    }
}
