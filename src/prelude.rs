//! Prelude module for convenient imports.
//!
//! ```rust
//! use asyn_rt::prelude::*;
//! ```

// Supervision tree
pub use crate::group::TaskGroup;
pub use crate::handle::{ScopeGuard, TaskHandle};
pub use crate::state::{Priority, TaskState};

// Combinators
pub use crate::combinators::{
    as_completed, gather, gather_collecting, shield, timeout, timeout_at, wait, wait_for,
    ReturnWhen,
};

// Resource accounting
pub use crate::info::{ResourceLimits, ResourceStats, TaskSnapshot, TaskTreeNode};
pub use crate::probe::{ProbeSample, ResourceProbe};

// Infrastructure
pub use crate::config::SupervisorConfig;
pub use crate::error::{AggregateError, RunError, SupervisorError};
pub use crate::runtime::Runtime;
pub use crate::util::TaskId;
