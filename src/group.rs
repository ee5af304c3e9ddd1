//! `TaskGroup`: a scoped fan-out/fan-in container that aggregates its
//! children's failures into a single error at exit.

// Layer 1: Standard library imports
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

// Layer 2: Third-party crate imports
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

// Layer 3: Internal module imports
use crate::error::{AggregateError, RunError, SupervisorError};
use crate::handle::TaskHandle;
use crate::state::Priority;

/// A member's outcome, stripped of its original error type so the group can
/// aggregate failures from children of different coroutine types uniformly.
enum MemberOutcome {
    Completed,
    Failed(Box<dyn StdError + Send + Sync>),
    Cancelled,
}

/// Wraps a child's stringified failure so it can be boxed as a trait object
/// without carrying the original (now type-erased) error type.
#[derive(Debug)]
struct MemberError {
    task_name: String,
    message: String,
}

impl fmt::Display for MemberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task '{}' failed: {}", self.task_name, self.message)
    }
}

impl StdError for MemberError {}

/// A scoped fan-out/fan-in container. `create_task` spawns supervised
/// children under the group's parent handle; `exit` awaits every spawned
/// child and raises [`AggregateError`] if any of them failed.
pub struct TaskGroup {
    parent: TaskHandle,
    active: AtomicBool,
    members: Mutex<Vec<(TaskHandle, JoinHandle<MemberOutcome>)>>,
}

impl TaskGroup {
    /// Activates a new group scoped under `parent`.
    pub fn new(parent: &TaskHandle) -> Self {
        Self {
            parent: parent.clone(),
            active: AtomicBool::new(true),
            members: Mutex::new(Vec::new()),
        }
    }

    /// Spawns a supervised child in this group. Fails with
    /// [`SupervisorError::ClosedScope`] if the group is not active.
    pub fn create_task<F, T, E>(
        &self,
        name: Option<String>,
        fut: F,
    ) -> Result<TaskHandle, SupervisorError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        if !self.active.load(Ordering::SeqCst) {
            return Err(SupervisorError::ClosedScope {
                id: self.parent.id(),
                name: self.parent.name(),
            });
        }

        let child = self.parent.new_child(
            name.unwrap_or_else(|| format!("group-member-{}", self.members.lock().len())),
            Priority::Normal,
        )?;
        let task_name = child.name();
        let runner = child.clone();
        let join = tokio::spawn(async move {
            match runner.run(fut).await {
                Ok(_) => MemberOutcome::Completed,
                Err(RunError::Cancelled { .. }) => MemberOutcome::Cancelled,
                Err(RunError::Failed(err)) => MemberOutcome::Failed(Box::new(MemberError {
                    task_name,
                    message: err.to_string(),
                })),
            }
        });
        self.members.lock().push((child.clone(), join));
        Ok(child)
    }

    /// Awaits every spawned child. On the first observed failure, cancels
    /// the remaining siblings before collecting the rest of the outcomes.
    /// Returns the aggregate of every non-cancel failure.
    pub async fn exit(self) -> Result<(), AggregateError> {
        self.active.store(false, Ordering::SeqCst);
        let members = self.members.into_inner();
        let handles: Vec<TaskHandle> = members.iter().map(|(h, _)| h.clone()).collect();

        let mut pending = FuturesUnordered::new();
        for (index, (_, join)) in members.into_iter().enumerate() {
            pending.push(async move { (index, join.await) });
        }

        let mut causes: Vec<Box<dyn StdError + Send + Sync>> = Vec::new();
        let mut siblings_cancelled = false;

        while let Some((index, outcome)) = pending.next().await {
            match outcome {
                Ok(MemberOutcome::Failed(cause)) => {
                    causes.push(cause);
                    if !siblings_cancelled {
                        siblings_cancelled = true;
                        for (j, sibling) in handles.iter().enumerate() {
                            if j != index {
                                sibling
                                    .cancel(true, None, Some("sibling task failed".into()))
                                    .await;
                            }
                        }
                    }
                }
                Ok(MemberOutcome::Cancelled | MemberOutcome::Completed) => {}
                Err(join_err) => {
                    warn!(error = %join_err, "group member task panicked or was aborted");
                }
            }
        }

        if causes.is_empty() {
            Ok(())
        } else {
            Err(AggregateError::new(causes))
        }
    }
}
