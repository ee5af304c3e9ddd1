//! The task handle: the public façade over a node in the supervision tree.

// Layer 1: Standard library imports
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// Layer 3: Internal module imports
use crate::config::SupervisorConfig;
use crate::error::{RunError, SupervisorError};
use crate::info::{debug_keys, Callback, ResourceLimits, TaskInfoInner, TaskSnapshot, TaskTreeNode};
use crate::monitor;
use crate::probe::ResourceProbe;
use crate::runtime::Runtime;
use crate::state::{Priority, TaskState};
use crate::util::TaskId;

/// The shared, lock-protected core of a task node.
///
/// Held behind an `Arc`; children keep only a `Weak<Inner>` back-pointer to
/// their parent so a child never keeps its parent alive.
pub(crate) struct Inner {
    pub(crate) id: TaskId,
    pub(crate) runtime: Runtime,
    pub(crate) config: SupervisorConfig,
    pub(crate) probe: Arc<dyn ResourceProbe>,
    pub(crate) info: Mutex<TaskInfoInner>,
    pub(crate) parent: Option<Weak<Inner>>,
    pub(crate) children: Mutex<Vec<Weak<Inner>>>,
    pub(crate) dependencies: Mutex<Vec<Weak<Inner>>>,
    pub(crate) dependents: Mutex<Vec<Weak<Inner>>>,
    pub(crate) terminal: Notify,
    pub(crate) cancel_signal: Notify,
    pub(crate) cancel_requested: AtomicBool,
    pub(crate) cancel_reason: Mutex<Option<String>>,
    pub(crate) monitor_handle: Mutex<Option<JoinHandle<()>>>,
    pub(crate) monitor_shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

/// A handle to a single node in the supervision tree.
///
/// Cloning a `TaskHandle` is cheap (an `Arc` clone); every clone refers to
/// the same underlying node.
#[derive(Clone)]
pub struct TaskHandle(pub(crate) Arc<Inner>);

/// Scoped acquisition for a handle: guarantees the cleanup protocol runs
/// exactly once when the scope ends, regardless of how it ends.
///
/// Rust destructors cannot `.await`, so `Drop` only asserts cleanup already
/// ran (in debug builds) rather than performing it; callers MUST call
/// [`ScopeGuard::finish`] at the scope boundary.
pub struct ScopeGuard {
    handle: TaskHandle,
    finished: bool,
}

impl ScopeGuard {
    /// Runs the cleanup protocol, classifying the exit as `Completed` unless
    /// the handle already reached a different terminal state.
    pub async fn finish(mut self) {
        self.handle.run_cleanup(TaskState::Completed).await;
        self.finished = true;
    }

    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                task = %self.handle.0.id,
                name = %self.handle.name(),
                "scope guard dropped without calling finish(); cleanup may be delayed"
            );
        }
    }
}

impl TaskHandle {
    /// Creates a root handle with no parent, owning the given runtime.
    pub fn root(name: impl Into<String>, runtime: Runtime) -> Self {
        Self::new_internal(name.into(), Priority::Normal, None, runtime, SupervisorConfig::default(), None)
    }

    /// Creates a root handle with explicit configuration and resource probe.
    pub fn root_with(
        name: impl Into<String>,
        runtime: Runtime,
        config: SupervisorConfig,
        probe: Arc<dyn ResourceProbe>,
    ) -> Self {
        Self::new_internal(name.into(), Priority::Normal, None, runtime, config, Some(probe))
    }

    /// Spawns a child node under this handle. Fails with [`SupervisorError::ClosedScope`]
    /// if this handle is already terminal.
    pub fn new_child(
        &self,
        name: impl Into<String>,
        priority: Priority,
    ) -> Result<TaskHandle, SupervisorError> {
        if self.state().is_terminal() {
            return Err(SupervisorError::ClosedScope {
                id: self.0.id,
                name: self.name(),
            });
        }

        let child = Self::new_internal(
            name.into(),
            priority,
            Some(Arc::downgrade(&self.0)),
            self.0.runtime.clone(),
            self.0.config.clone(),
            Some(Arc::clone(&self.0.probe)),
        );
        self.0.children.lock().push(Arc::downgrade(&child.0));
        info!(parent = %self.0.id, child = %child.0.id, name = %child.name(), "child registered");
        child
            .0
            .info
            .lock()
            .stats
            .child_tasks = self.0.children.lock().len() as u64;
        Ok(child)
    }

    fn new_internal(
        name: String,
        priority: Priority,
        parent: Option<Weak<Inner>>,
        runtime: Runtime,
        config: SupervisorConfig,
        probe: Option<Arc<dyn ResourceProbe>>,
    ) -> Self {
        let id = TaskId::new();
        let info = TaskInfoInner::new(name, priority, config.starvation_threshold);
        let inner = Arc::new(Inner {
            id,
            runtime,
            config: config.clone(),
            probe: probe.unwrap_or_else(crate::probe::default_probe),
            info: Mutex::new(info),
            parent,
            children: Mutex::new(Vec::new()),
            dependencies: Mutex::new(Vec::new()),
            dependents: Mutex::new(Vec::new()),
            terminal: Notify::new(),
            cancel_signal: Notify::new(),
            cancel_requested: AtomicBool::new(false),
            cancel_reason: Mutex::new(None),
            monitor_handle: Mutex::new(None),
            monitor_shutdown: Mutex::new(None),
        });
        let handle = Self(inner);
        let (join, shutdown_tx) = monitor::spawn(handle.clone(), config.monitor_interval);
        *handle.0.monitor_handle.lock() = Some(join);
        *handle.0.monitor_shutdown.lock() = Some(shutdown_tx);
        handle
    }

    /// Runs `fut` to completion under this handle, transitioning
    /// PENDING -> RUNNING -> a terminal state. Runs the cleanup protocol
    /// exactly once before returning.
    pub async fn run<F, T, E>(&self, fut: F) -> Result<T, RunError<E>>
    where
        F: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        let name = self.name();

        if self.0.cancel_requested.load(Ordering::SeqCst) {
            let reason = self.take_cancel_reason();
            self.run_cleanup(TaskState::Cancelled).await;
            return Err(RunError::Cancelled { name, reason });
        }

        self.begin_running();
        debug!(task = %self.0.id, name = %name, "task running");

        tokio::pin!(fut);
        enum Outcome<T, E> {
            Finished(Result<T, E>),
            Cancelled,
        }
        let outcome = tokio::select! {
            res = &mut fut => Outcome::Finished(res),
            _ = self.0.cancel_signal.notified() => Outcome::Cancelled,
        };

        match outcome {
            Outcome::Finished(Ok(value)) => {
                self.set_state(TaskState::Completed);
                info!(task = %self.0.id, name = %name, "task completed");
                self.run_cleanup(TaskState::Completed).await;
                Ok(value)
            }
            Outcome::Finished(Err(err)) => {
                let message = err.to_string();
                self.set_state(TaskState::Failed);
                {
                    let mut info = self.0.info.lock();
                    info.exception = Some(message.clone());
                    info.debug_info
                        .insert(debug_keys::TRACEBACK.into(), message.clone());
                }
                error!(task = %self.0.id, name = %name, error = %message, "task failed");
                self.run_cleanup(TaskState::Failed).await;
                Err(RunError::Failed(err))
            }
            Outcome::Cancelled => {
                let reason = self.take_cancel_reason();
                self.set_state(TaskState::Cancelled);
                self.run_cleanup(TaskState::Cancelled).await;
                Err(RunError::Cancelled { name, reason })
            }
        }
    }

    /// Spawns `fut` as a supervised child task on the owning runtime and
    /// returns its handle immediately (registration is synchronous).
    pub fn create_task<F, T, E>(
        &self,
        name: Option<String>,
        fut: F,
    ) -> Result<TaskHandle, SupervisorError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let child = self.new_child(
            name.unwrap_or_else(|| format!("task-{}", TaskId::new())),
            Priority::Normal,
        )?;
        let spawned = child.clone();
        self.0.runtime.tokio_handle().spawn(async move {
            let _ = spawned.run(fut).await;
        });
        Ok(child)
    }

    /// Cancels this node and, by default, its descendants. Idempotent.
    pub async fn cancel(&self, include_children: bool, timeout: Option<Duration>, reason: Option<String>) {
        if self.state().is_terminal() {
            return;
        }

        if !self.0.cancel_requested.swap(true, Ordering::SeqCst) {
            let text = reason.unwrap_or_else(|| "no reason given".to_string());
            self.0
                .info
                .lock()
                .debug_info
                .insert(debug_keys::CANCEL_REASON.into(), text.clone());
            *self.0.cancel_reason.lock() = Some(text);
            self.0.cancel_signal.notify_waiters();
        }

        if include_children {
            self.cancel_children(timeout.unwrap_or(self.0.config.cancel_timeout))
                .await;
        }

        self.run_cleanup(TaskState::Cancelled).await;
    }

    /// Suspends until every dependency has reached a terminal state.
    pub async fn wait_dependencies(&self) {
        loop {
            let pending: Vec<TaskHandle> = self
                .0
                .dependencies
                .lock()
                .iter()
                .filter_map(Weak::upgrade)
                .map(TaskHandle)
                .filter(|h| !h.state().is_terminal())
                .collect();
            if pending.is_empty() {
                return;
            }
            futures::future::join_all(pending.iter().map(|h| h.0.terminal.notified())).await;
        }
    }

    /// Suspends until the children registry is empty (all children terminal
    /// and detached during their own cleanup).
    pub async fn wait_for_children(&self) {
        loop {
            if self.0.children.lock().is_empty() {
                return;
            }
            self.0.terminal.notified().await;
        }
    }

    /// Adds a dependency edge `self -> other` (self depends on other).
    /// Rejects the edge with [`SupervisorError::CycleDetected`] if it would
    /// create a cycle, leaving the graph unchanged.
    pub fn add_dependency(&self, other: &TaskHandle) -> Result<(), SupervisorError> {
        if self
            .0
            .dependencies
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .any(|w| Arc::ptr_eq(&w, &other.0))
        {
            return Err(SupervisorError::DuplicateDependency {
                dependent: self.0.id,
                dependency: other.0.id,
            });
        }

        if let Some(path) = monitor::deadlock::would_cycle(other, self) {
            return Err(SupervisorError::CycleDetected { path });
        }

        self.0.dependencies.lock().push(Arc::downgrade(&other.0));
        other.0.dependents.lock().push(Arc::downgrade(&self.0));
        Ok(())
    }

    /// Removes a previously-added dependency edge.
    pub fn remove_dependency(&self, other: &TaskHandle) -> Result<(), SupervisorError> {
        let mut deps = self.0.dependencies.lock();
        let before = deps.len();
        deps.retain(|w| w.upgrade().is_none_or(|w| !Arc::ptr_eq(&w, &other.0)));
        if deps.len() == before {
            return Err(SupervisorError::MissingDependency {
                dependent: self.0.id,
                dependency: other.0.id,
            });
        }
        drop(deps);
        other
            .0
            .dependents
            .lock()
            .retain(|w| w.upgrade().is_none_or(|w| !Arc::ptr_eq(&w, &self.0)));
        Ok(())
    }

    /// Sets (a subset of) the resource ceilings enforced by the monitor.
    pub fn set_resource_limit(&self, limits: ResourceLimits) {
        self.0.info.lock().limits = limits;
    }

    /// Registers a cleanup callback, run in registration order during
    /// cleanup step 4.
    pub fn register_cleanup(&self, callback: impl Into<Callback>) {
        self.0.info.lock().cleanup_callbacks.push(callback.into());
    }

    /// Enters the handle's scope, transitioning PENDING -> RUNNING. The
    /// returned [`ScopeGuard`] must have `finish` called on it at scope exit.
    pub async fn scope(&self) -> ScopeGuard {
        self.begin_running();
        ScopeGuard {
            handle: self.clone(),
            finished: false,
        }
    }

    pub fn id(&self) -> TaskId {
        self.0.id
    }

    /// The runtime this handle (and every descendant) was constructed with.
    pub fn runtime(&self) -> Runtime {
        self.0.runtime.clone()
    }

    /// A future that resolves once this handle reaches a terminal state.
    /// Combinators poll this instead of the raw `JoinHandle` so cancellation
    /// and cleanup-driven terminality are both observed.
    pub fn terminal_notified(&self) -> tokio::sync::Notified<'_> {
        self.0.terminal.notified()
    }

    pub fn name(&self) -> String {
        self.0.info.lock().name.clone()
    }

    pub fn state(&self) -> TaskState {
        self.0.info.lock().state
    }

    pub fn children(&self) -> Vec<TaskHandle> {
        self.0
            .children
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(TaskHandle)
            .collect()
    }

    pub fn parent(&self) -> Option<TaskHandle> {
        self.0.parent.as_ref().and_then(Weak::upgrade).map(TaskHandle)
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.0.info.lock().snapshot(self.0.id)
    }

    /// Returns a nested view of this handle and its live descendants.
    pub fn get_task_tree(&self) -> TaskTreeNode {
        TaskTreeNode {
            name: self.name(),
            state: self.state(),
            children: self.children().iter().map(TaskHandle::get_task_tree).collect(),
        }
    }

    // --- internal helpers -------------------------------------------------

    fn begin_running(&self) {
        let mut info = self.0.info.lock();
        if info.state == TaskState::Pending {
            info.state = TaskState::Running;
            info.start_time = Some(Utc::now());
            info.last_active = Utc::now();
        }
    }

    fn set_state(&self, state: TaskState) {
        self.0.info.lock().state = state;
    }

    fn take_cancel_reason(&self) -> String {
        self.0
            .cancel_reason
            .lock()
            .clone()
            .unwrap_or_else(|| "no reason given".to_string())
    }

    async fn cancel_children(&self, timeout: Duration) {
        let children = self.children();
        if children.is_empty() {
            return;
        }
        let reason = self.take_cancel_reason_for_propagation();
        let fan_out = children.iter().map(|child| {
            let reason = reason.clone();
            async move {
                child
                    .cancel(true, Some(timeout), Some(reason))
                    .await;
            }
        });
        let all = futures::future::join_all(fan_out);
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!(
                task = %self.0.id,
                name = %self.name(),
                "one or more children did not terminate within cancel_timeout; recorded as leaked"
            );
        }
    }

    fn take_cancel_reason_for_propagation(&self) -> String {
        let reason = self.0.cancel_reason.lock().clone();
        match reason {
            Some(r) => format!("Parent cancelled: {r}"),
            None => "Parent cancelled".to_string(),
        }
    }

    async fn notify_dependents(&self, final_state: TaskState) {
        if final_state == TaskState::Completed {
            return;
        }
        let name = self.name();
        let dependents: Vec<TaskHandle> = self
            .0
            .dependents
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(TaskHandle)
            .collect();
        for dependent in dependents {
            if dependent.state().is_terminal() {
                continue;
            }
            let mut info = dependent.0.info.lock();
            info.state = TaskState::Blocked;
            info.debug_info.insert(
                debug_keys::BLOCKED_REASON.into(),
                format!("dependency cancelled: {name}"),
            );
        }
    }

    async fn stop_monitor(&self) {
        if let Some(tx) = self.0.monitor_shutdown.lock().take() {
            let _ = tx.send(());
        }
        let handle = self.0.monitor_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run_callbacks(&self) {
        let callbacks = std::mem::take(&mut self.0.info.lock().cleanup_callbacks);
        for callback in callbacks {
            let result = match callback {
                Callback::Sync(f) => std::panic::catch_unwind(std::panic::AssertUnwindSafe(f))
                    .map_err(|_| "cleanup callback panicked".to_string()),
                Callback::Async(f) => {
                    let fut = f();
                    fut.await;
                    Ok(())
                }
            };
            if let Err(message) = result {
                error!(task = %self.0.id, name = %self.name(), error = %message, "cleanup callback failed");
            }
        }
    }

    fn finalize_stats(&self) {
        let mut info = self.0.info.lock();
        if info.end_time.is_none() {
            info.end_time = Some(Utc::now());
        }
        if let Some(start) = info.start_time {
            info.stats.total_runtime = (Utc::now() - start)
                .to_std()
                .unwrap_or(info.stats.total_runtime);
        }
    }

    fn detach_from_parent(&self) {
        if let Some(parent) = self.parent() {
            parent
                .0
                .children
                .lock()
                .retain(|w| w.upgrade().is_none_or(|w| !Arc::ptr_eq(&w, &self.0)));
        }
    }

    /// Runs the single-shot cleanup protocol. `default_exit` is the state to
    /// classify the handle as if it has not already reached a terminal
    /// state through [`TaskHandle::run`].
    pub(crate) async fn run_cleanup(&self, default_exit: TaskState) {
        {
            let mut info = self.0.info.lock();
            if info.cleanup_ran {
                return;
            }
            info.cleanup_ran = true;
        }

        // Step 1: stop monitor.
        self.stop_monitor().await;
        // Step 2: cancel children with bounded fan-out.
        self.cancel_children(self.0.config.cancel_timeout).await;
        // Step 3: cancel self if still non-terminal.
        if !self.state().is_terminal() {
            self.set_state(TaskState::Cancelled);
        }
        // Step 4: run cleanup callbacks in registration order.
        self.run_callbacks().await;
        // Step 5: finalize stats and detach from parent registry.
        self.finalize_stats();
        self.detach_from_parent();
        // Step 6: classify exit (no-op if already terminal from `run`).
        if !self.state().is_terminal() {
            self.set_state(default_exit);
        }

        let final_state = self.state();
        self.0.terminal.notify_waiters();
        self.notify_dependents(final_state).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use std::io;

    fn test_runtime() -> Runtime {
        Runtime::current()
    }

    #[tokio::test]
    async fn test_root_starts_pending() {
        let handle = TaskHandle::root("root", test_runtime());
        assert_eq!(handle.state(), TaskState::Pending);
    }

    #[tokio::test]
    async fn test_run_completes_on_ok() {
        let handle = TaskHandle::root("root", test_runtime());
        let result: Result<u32, io::Error> = handle.run(async { Ok(42) }).await.map_err(|e| match e {
            RunError::Failed(e) => e,
            RunError::Cancelled { .. } => io::Error::new(io::ErrorKind::Other, "cancelled"),
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(handle.state(), TaskState::Completed);
        assert!(handle.snapshot().end_time.is_some());
    }

    #[tokio::test]
    async fn test_run_fails_on_err() {
        let handle = TaskHandle::root("root", test_runtime());
        let fut = async { Err::<u32, _>(io::Error::new(io::ErrorKind::Other, "boom")) };
        let result = handle.run(fut).await;
        assert!(result.is_err());
        assert_eq!(handle.state(), TaskState::Failed);
    }

    #[tokio::test]
    async fn test_new_child_registers_under_parent() {
        let parent = TaskHandle::root("parent", test_runtime());
        let child = parent.new_child("child", Priority::Normal).unwrap();
        assert_eq!(parent.children().len(), 1);
        assert_eq!(child.parent().unwrap().id(), parent.id());
    }

    #[tokio::test]
    async fn test_new_child_rejects_on_terminal_parent() {
        let parent = TaskHandle::root("parent", test_runtime());
        let _: Result<u32, io::Error> = parent.run(async { Ok(1) }).await.map_err(|_| unreachable!());
        let result = parent.new_child("late", Priority::Normal);
        assert!(matches!(result, Err(SupervisorError::ClosedScope { .. })));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let handle = TaskHandle::root("root", test_runtime());
        handle.cancel(true, None, Some("first".into())).await;
        handle.cancel(true, None, Some("second".into())).await;
        assert_eq!(handle.state(), TaskState::Cancelled);
    }

    #[tokio::test]
    async fn test_dependency_symmetry() {
        let a = TaskHandle::root("a", test_runtime());
        let b = TaskHandle::root("b", test_runtime());
        b.add_dependency(&a).unwrap();
        assert_eq!(a.0.dependents.lock().len(), 1);
        assert_eq!(b.0.dependencies.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_dependency_rejected() {
        let a = TaskHandle::root("a", test_runtime());
        let b = TaskHandle::root("b", test_runtime());
        b.add_dependency(&a).unwrap();
        let err = b.add_dependency(&a).unwrap_err();
        assert!(matches!(err, SupervisorError::DuplicateDependency { .. }));
    }

    #[tokio::test]
    async fn test_cleanup_runs_once() {
        let handle = TaskHandle::root("root", test_runtime());
        handle.run_cleanup(TaskState::Completed).await;
        handle.run_cleanup(TaskState::Failed).await;
        assert_eq!(handle.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn test_parent_children_empty_after_child_cleanup() {
        let parent = TaskHandle::root("parent", test_runtime());
        let child = parent.new_child("child", Priority::Normal).unwrap();
        child.run_cleanup(TaskState::Completed).await;
        assert!(parent.children().is_empty());
    }
}
