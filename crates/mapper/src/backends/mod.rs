//! Query executor abstractions and the in-memory backend

pub mod core;
pub mod memory;

pub use core::*;
pub use memory::{MemoryExecutor, QueryKind, QueryLogEntry};
