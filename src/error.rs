//! Error types for the supervisor.
//!
//! Error variants follow canonical struct/enum conventions: contextual
//! fields, `#[source]` chaining, and predicate helper methods so callers
//! can branch on error category without matching every variant.

// Layer 1: Standard library imports
use std::error::Error as StdError;
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::util::TaskId;

/// Errors returned by supervisor operations.
///
/// # Examples
/// ```rust
/// use asyn_rt::SupervisorError;
///
/// fn handle(err: &SupervisorError) {
///     if err.is_graph_error() {
///         eprintln!("dependency graph rejected the edge");
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Operation attempted on a handle whose scope has already exited.
    #[error("operation attempted on closed scope for task '{name}' ({id})")]
    ClosedScope { id: TaskId, name: String },

    /// Attempted state transition is not legal from the current state.
    #[error("invalid transition for task '{name}' ({id}): {from} -> {to}")]
    InvalidTransition {
        id: TaskId,
        name: String,
        from: String,
        to: String,
    },

    /// Adding the dependency would create a cycle in the dependency graph.
    #[error("dependency cycle detected: {}", cycle_path(path))]
    CycleDetected { path: Vec<TaskId> },

    /// The dependency edge already exists.
    #[error("duplicate dependency: {dependent} already depends on {dependency}")]
    DuplicateDependency {
        dependent: TaskId,
        dependency: TaskId,
    },

    /// The dependency edge does not exist and cannot be removed.
    #[error("missing dependency: {dependent} does not depend on {dependency}")]
    MissingDependency {
        dependent: TaskId,
        dependency: TaskId,
    },

    /// A configured resource ceiling was crossed.
    #[error("resource exceeded for task '{name}' ({id}): {which} = {value} > limit {limit}")]
    ResourceExceeded {
        id: TaskId,
        name: String,
        which: String,
        value: u64,
        limit: u64,
    },

    /// A bounded wait elapsed before the awaited work terminated.
    #[error("timeout after {elapsed:?} waiting for '{name}'")]
    Timeout { name: String, elapsed: Duration },
}

impl SupervisorError {
    /// Lifecycle errors: recovered locally, never surfaced to children.
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            Self::ClosedScope { .. } | Self::InvalidTransition { .. }
        )
    }

    /// Graph errors: returned to the `add_dependency`/`remove_dependency` caller
    /// without mutating the dependency graph.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            Self::CycleDetected { .. }
                | Self::DuplicateDependency { .. }
                | Self::MissingDependency { .. }
        )
    }

    /// `true` if the monitor raised this as a crossed ceiling.
    pub fn is_resource_error(&self) -> bool {
        matches!(self, Self::ResourceExceeded { .. })
    }

    /// `true` if this originated from a bounded wait elapsing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The task id this error concerns, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::ClosedScope { id, .. }
            | Self::InvalidTransition { id, .. }
            | Self::ResourceExceeded { id, .. } => Some(*id),
            _ => None,
        }
    }
}

fn cycle_path(path: &[TaskId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// The outcome of `TaskHandle::run`: either the coroutine's own result, or
/// the reason the handle ended without producing one.
#[derive(Debug, Error)]
pub enum RunError<E>
where
    E: StdError + Send + Sync + 'static,
{
    /// The coroutine itself returned an error.
    #[error(transparent)]
    Failed(#[from] E),

    /// The handle was cancelled before or during the coroutine's execution.
    #[error("task '{name}' was cancelled: {reason}")]
    Cancelled { name: String, reason: String },
}

/// Aggregated failure raised at `TaskGroup` exit, carrying every non-cancel
/// failure observed from the group's children.
#[derive(Debug, Error)]
#[error("task group failed with {} error(s): {}", causes.len(), join_causes(causes))]
pub struct AggregateError {
    pub causes: Vec<Box<dyn StdError + Send + Sync>>,
}

impl AggregateError {
    pub fn new(causes: Vec<Box<dyn StdError + Send + Sync>>) -> Self {
        Self { causes }
    }

    /// `true` if no child actually failed (an empty aggregate should never
    /// be raised by `TaskGroup`, but callers may construct one for testing).
    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.causes.len()
    }
}

fn join_causes(causes: &[Box<dyn StdError + Send + Sync>]) -> String {
    causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_closed_scope_is_lifecycle_error() {
        let err = SupervisorError::ClosedScope {
            id: TaskId::new(),
            name: "worker".into(),
        };
        assert!(err.is_lifecycle_error());
        assert!(!err.is_graph_error());
    }

    #[test]
    fn test_cycle_detected_formats_path() {
        let a = TaskId::new();
        let b = TaskId::new();
        let err = SupervisorError::CycleDetected { path: vec![a, b] };
        assert!(err.is_graph_error());
        let msg = err.to_string();
        assert!(msg.contains(&a.to_string()));
        assert!(msg.contains(&b.to_string()));
    }

    #[test]
    fn test_resource_exceeded_predicate() {
        let err = SupervisorError::ResourceExceeded {
            id: TaskId::new(),
            name: "worker".into(),
            which: "runtime".into(),
            value: 10,
            limit: 5,
        };
        assert!(err.is_resource_error());
        assert!(err.to_string().contains("runtime"));
    }

    #[test]
    fn test_run_error_from_user_error() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let err: RunError<io::Error> = RunError::from(io_err);
        assert!(matches!(err, RunError::Failed(_)));
    }

    #[test]
    fn test_aggregate_error_join() {
        let causes: Vec<Box<dyn std::error::Error + Send + Sync>> = vec![
            Box::new(io::Error::new(io::ErrorKind::Other, "v")),
            Box::new(io::Error::new(io::ErrorKind::Other, "r")),
        ];
        let agg = AggregateError::new(causes);
        assert_eq!(agg.len(), 2);
        assert!(!agg.is_empty());
        assert!(agg.to_string().contains("2 error"));
    }
}
