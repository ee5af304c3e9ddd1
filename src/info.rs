//! Per-task metadata: resource accounting, limits, and cleanup callbacks.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::state::{Priority, TaskState};
use crate::util::TaskId;

/// Monotonically-updated resource counters, refreshed by the monitor loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub peak_memory: u64,
    pub total_runtime: Duration,
    pub io_operations: u64,
    pub network_calls: u64,
    pub child_tasks: u64,
}

/// Optional ceilings enforced by the monitor loop. `None` means "no ceiling".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_memory: Option<u64>,
    pub max_runtime: Option<Duration>,
    pub max_io_ops: Option<u64>,
    pub max_network_calls: Option<u64>,
    pub max_children: Option<u64>,
}

/// A cleanup callback, dispatched by match rather than by runtime reflection.
///
/// Callbacks run in registration order during step 4 of cleanup; a sync
/// callback runs inline, an async one is awaited.
pub enum Callback {
    Sync(Box<dyn FnOnce() + Send>),
    Async(Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>),
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Callback::Sync(..)"),
            Self::Async(_) => f.write_str("Callback::Async(..)"),
        }
    }
}

impl<F> From<F> for Callback
where
    F: FnOnce() + Send + 'static,
{
    fn from(f: F) -> Self {
        Self::Sync(Box::new(f))
    }
}

/// Wraps an async closure so it can be registered via `register_cleanup`.
///
/// `Callback`'s blanket `From` impl covers plain sync closures; async
/// cleanup callbacks must be wrapped explicitly since `FnOnce() -> impl Future`
/// and `FnOnce()` overlap from the trait solver's point of view.
pub fn async_callback<F, Fut>(f: F) -> Callback
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Callback::Async(Box::new(move || Box::pin(f())))
}

/// Opaque debug values attached to a task's `debug_info` map.
pub type DebugValue = String;

/// Well-known `debug_info` keys, so call sites do not scatter string literals.
pub mod debug_keys {
    pub const CANCEL_REASON: &str = "cancel_reason";
    pub const BLOCKED_REASON: &str = "blocked_reason";
    pub const TRACEBACK: &str = "traceback";
    pub const STARVING: &str = "starving";
    pub fn child_error(name: &str) -> String {
        format!("child_error_{name}")
    }
}

/// A read-only, owned view of a handle's metadata at the moment it was taken.
///
/// Unlike the live `TaskInfo`, a `TaskSnapshot` may safely outlive the
/// handle it was copied from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub priority: Priority,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub exception: Option<String>,
    pub stats: ResourceStats,
    pub limits: ResourceLimits,
    pub debug_info: HashMap<String, DebugValue>,
    pub last_active: DateTime<Utc>,
    pub starvation_threshold: Duration,
}

/// A nested view of a handle and its descendants, as returned by
/// `TaskHandle::get_task_tree`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTreeNode {
    pub name: String,
    pub state: TaskState,
    pub children: Vec<TaskTreeNode>,
}

/// The mutable, lock-protected core of a task handle. Lives inside a
/// `parking_lot::Mutex` owned by the handle; never shared or cloned out.
pub(crate) struct TaskInfoInner {
    pub name: String,
    pub state: TaskState,
    pub priority: Priority,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub exception: Option<String>,
    pub stats: ResourceStats,
    pub limits: ResourceLimits,
    pub debug_info: HashMap<String, DebugValue>,
    pub cleanup_callbacks: Vec<Callback>,
    pub last_active: DateTime<Utc>,
    pub starvation_threshold: Duration,
    pub cleanup_ran: bool,
}

impl TaskInfoInner {
    pub fn new(name: String, priority: Priority, starvation_threshold: Duration) -> Self {
        let now = Utc::now();
        Self {
            name,
            state: TaskState::Pending,
            priority,
            start_time: None,
            end_time: None,
            exception: None,
            stats: ResourceStats::default(),
            limits: ResourceLimits::default(),
            debug_info: HashMap::new(),
            cleanup_callbacks: Vec::new(),
            last_active: now,
            starvation_threshold,
            cleanup_ran: false,
        }
    }

    pub fn snapshot(&self, id: TaskId) -> TaskSnapshot {
        TaskSnapshot {
            id,
            name: self.name.clone(),
            state: self.state,
            priority: self.priority,
            start_time: self.start_time,
            end_time: self.end_time,
            exception: self.exception.clone(),
            stats: self.stats,
            limits: self.limits,
            debug_info: self.debug_info.clone(),
            last_active: self.last_active,
            starvation_threshold: self.starvation_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_stats_default_is_zero() {
        let stats = ResourceStats::default();
        assert_eq!(stats.peak_memory, 0);
        assert_eq!(stats.total_runtime, Duration::ZERO);
    }

    #[test]
    fn test_resource_limits_default_is_unbounded() {
        let limits = ResourceLimits::default();
        assert!(limits.max_memory.is_none());
        assert!(limits.max_runtime.is_none());
    }

    #[test]
    fn test_task_info_inner_starts_pending() {
        let info = TaskInfoInner::new("root".into(), Priority::Normal, Duration::from_secs(60));
        assert_eq!(info.state, TaskState::Pending);
        assert!(info.start_time.is_none());
        assert!(!info.cleanup_ran);
    }

    #[test]
    fn test_snapshot_copies_current_fields() {
        let mut info = TaskInfoInner::new("worker".into(), Priority::High, Duration::from_secs(30));
        info.state = TaskState::Running;
        info.debug_info
            .insert(debug_keys::CANCEL_REASON.into(), "demo".into());

        let id = TaskId::new();
        let snap = info.snapshot(id);
        assert_eq!(snap.id, id);
        assert_eq!(snap.name, "worker");
        assert_eq!(snap.state, TaskState::Running);
        assert_eq!(
            snap.debug_info.get(debug_keys::CANCEL_REASON),
            Some(&"demo".to_string())
        );
    }

    #[test]
    fn test_child_error_key_format() {
        assert_eq!(debug_keys::child_error("c1"), "child_error_c1");
    }
}
