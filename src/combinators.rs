//! Structured-concurrency combinators: `gather`, `wait`, `as_completed`,
//! `shield`, `wait_for`, `timeout`, `timeout_at`.
//!
//! Every combinator preserves the supervision invariant: each coroutine
//! passed in runs under a handle, either a transient child spawned here
//! with a generated name, or the caller's own handle for `shield`.

// Layer 1: Standard library imports
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};

// Layer 3: Internal module imports
use crate::error::RunError;
use crate::handle::TaskHandle;
use crate::state::Priority;

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// Awaits every coroutine; on the first failure, cancels the remaining
/// children and returns that failure. Returns results in input order.
pub async fn gather<T, E>(
    parent: &TaskHandle,
    coros: Vec<BoxFuture<T, E>>,
) -> Result<Vec<T>, RunError<E>>
where
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    let children = spawn_children(parent, coros.len())?;
    let mut pending = FuturesUnordered::new();
    for (index, (child, fut)) in children.iter().cloned().zip(coros).enumerate() {
        pending.push(async move { (index, child.run(fut).await) });
    }

    let mut slots: Vec<Option<T>> = (0..children.len()).map(|_| None).collect();
    while let Some((index, result)) = pending.next().await {
        match result {
            Ok(value) => slots[index] = Some(value),
            Err(err) => {
                for (j, sibling) in children.iter().enumerate() {
                    if j != index {
                        sibling
                            .cancel(true, None, Some("sibling in gather failed".into()))
                            .await;
                    }
                }
                return Err(err);
            }
        }
    }

    Ok(slots.into_iter().map(|v| v.expect("filled by loop above")).collect())
}

/// Like [`gather`], but never cancels siblings early: every coroutine runs
/// to completion and its outcome (success or failure) is reported in order.
pub async fn gather_collecting<T, E>(
    parent: &TaskHandle,
    coros: Vec<BoxFuture<T, E>>,
) -> Vec<Result<T, RunError<E>>>
where
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    let children = match spawn_children(parent, coros.len()) {
        Ok(children) => children,
        Err(err) => return coros.iter().map(|_| Err(clone_closed_scope(&err))).collect(),
    };

    let runs = children.into_iter().zip(coros).map(|(child, fut)| async move { child.run(fut).await });
    futures::future::join_all(runs).await
}

fn clone_closed_scope<E>(err: &RunError<E>) -> RunError<E>
where
    E: StdError + Send + Sync + 'static,
{
    match err {
        RunError::Cancelled { name, reason } => RunError::Cancelled {
            name: name.clone(),
            reason: reason.clone(),
        },
        RunError::Failed(_) => RunError::Cancelled {
            name: "unknown".into(),
            reason: "parent scope closed".into(),
        },
    }
}

fn spawn_children<T, E>(parent: &TaskHandle, count: usize) -> Result<Vec<TaskHandle>, RunError<E>>
where
    E: StdError + Send + Sync + 'static,
{
    (0..count)
        .map(|i| {
            parent
                .new_child(format!("gather-{i}"), Priority::Normal)
                .map_err(|_| RunError::Cancelled {
                    name: parent.name(),
                    reason: "parent scope closed".into(),
                })
        })
        .collect()
}

/// What condition ends [`wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnWhen {
    FirstCompleted,
    AllCompleted,
}

/// Thin wrapper over polling handle terminality; returns the handles that
/// reached a terminal state and those still pending when the wait ended.
pub async fn wait(
    handles: Vec<TaskHandle>,
    timeout: Option<Duration>,
    return_when: ReturnWhen,
) -> (Vec<TaskHandle>, Vec<TaskHandle>) {
    let wait_body = async {
        loop {
            let (done, pending): (Vec<_>, Vec<_>) =
                handles.iter().cloned().partition(|h| h.state().is_terminal());
            let should_return = match return_when {
                ReturnWhen::FirstCompleted => !done.is_empty(),
                ReturnWhen::AllCompleted => pending.is_empty(),
            };
            if should_return {
                return (done, pending);
            }
            let notifications = handles.iter().map(|h| h.terminal_notified());
            futures::future::select_all(notifications.map(Box::pin)).await;
        }
    };

    match timeout {
        Some(duration) => tokio::time::timeout(duration, wait_body)
            .await
            .unwrap_or_else(|_| {
                handles
                    .iter()
                    .cloned()
                    .partition(|h| h.state().is_terminal())
            }),
        None => wait_body.await,
    }
}

/// Yields child handles of `parent` in completion order.
pub fn as_completed(
    parent: &TaskHandle,
    timeout: Option<Duration>,
) -> impl futures::Stream<Item = TaskHandle> {
    let deadline = timeout.map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or_default());
    let parent = parent.clone();
    futures::stream::unfold((parent, deadline), |(parent, deadline)| async move {
        loop {
            if let Some(deadline) = deadline {
                if Utc::now() >= deadline {
                    return None;
                }
            }
            let pending: Vec<TaskHandle> = parent.children().into_iter().filter(|c| !c.state().is_terminal()).collect();
            let completed: Vec<TaskHandle> = parent.children().into_iter().filter(|c| c.state().is_terminal()).collect();
            if let Some(first) = completed.into_iter().next() {
                return Some((first, (parent, deadline)));
            }
            if pending.is_empty() {
                return None;
            }
            let notifications = pending.iter().map(TaskHandle::terminal_notified);
            futures::future::select_all(notifications.map(Box::pin)).await;
        }
    })
}

/// Prevents external cancellation of `parent` from propagating into `fut`.
/// The shielded future still runs under its own transient child, so its own
/// cleanup still applies; only the parent's cancellation signal is blocked.
pub async fn shield<T, E>(parent: &TaskHandle, fut: BoxFuture<T, E>) -> Result<T, RunError<E>>
where
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    let shielded = TaskHandle::root(format!("shield-of-{}", parent.name()), parent.runtime());
    shielded.run(fut).await
}

/// Cancels and reports a timeout if `fut` does not terminate within `timeout`.
pub async fn wait_for<T, E>(
    parent: &TaskHandle,
    fut: BoxFuture<T, E>,
    timeout: Duration,
) -> Result<T, RunError<E>>
where
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    let child = parent
        .new_child("wait_for", Priority::Normal)
        .map_err(|_| RunError::Cancelled {
            name: parent.name(),
            reason: "parent scope closed".into(),
        })?;
    let name = child.name();
    let run = child.run(fut);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result,
        _ = tokio::time::sleep(timeout) => {
            child.cancel(true, None, Some("timed out".into())).await;
            Err(RunError::Cancelled { name, reason: format!("timed out after {timeout:?}") })
        }
    }
}

/// Cancels the enclosing handle if `delay` elapses before scope exit.
pub async fn timeout<T, E>(parent: &TaskHandle, fut: BoxFuture<T, E>, delay: Duration) -> Result<T, RunError<E>>
where
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    wait_for(parent, fut, delay).await
}

/// Like [`timeout`], but expressed as an absolute deadline.
pub async fn timeout_at<T, E>(
    parent: &TaskHandle,
    fut: BoxFuture<T, E>,
    deadline: DateTime<Utc>,
) -> Result<T, RunError<E>>
where
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    wait_for(parent, fut, remaining).await
}
