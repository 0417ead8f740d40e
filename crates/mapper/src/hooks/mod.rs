//! Lifecycle hook pipeline
//!
//! Named operations are intercepted by ordered pre-hooks and post-hooks.
//! Pre-hooks may be synchronous, future-returning or continuation-passing.
//! A pre-hook error short-circuits the operation before its core runs.

pub mod context;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use context::{Continuation, HookContext, HookOutcome, HookPhase, Operation};
pub use error::HookError;
pub use registry::{HookRegistry, PostHook, PreHook};
