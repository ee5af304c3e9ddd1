//! The per-handle monitor loop: periodic resource sampling, zombie
//! collection, starvation flagging, limit enforcement, and deadlock scans.

// Layer 1: Standard library imports
use std::sync::Weak;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

// Layer 3: Internal module imports
use crate::handle::TaskHandle;
use crate::info::debug_keys;
use crate::state::TaskState;
use crate::util::TaskId;

/// Spawns the background monitor task for `handle`. Returns its join handle
/// and a one-shot sender used to request a clean stop (cleanup step 1).
pub(crate) fn spawn(handle: TaskHandle, interval: Duration) -> (JoinHandle<()>, oneshot::Sender<()>) {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick is immediate; skip it
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    sweep(&handle).await;
                }
            }
        }
    });
    (join, shutdown_tx)
}

async fn sweep(handle: &TaskHandle) {
    if handle.state().is_terminal() {
        return;
    }

    refresh_stats(handle);

    if handle.state() == TaskState::Running {
        handle.0.info.lock().last_active = Utc::now();
    }

    collect_zombies(handle);
    check_limits(handle).await;
    check_starvation(handle);
    scan_deadlocks(handle).await;
}

fn refresh_stats(handle: &TaskHandle) {
    let sample = handle.0.probe.sample();
    let mut info = handle.0.info.lock();
    info.stats.peak_memory = info.stats.peak_memory.max(sample.memory_bytes);
    if let Some(start) = info.start_time {
        info.stats.total_runtime = (Utc::now() - start).to_std().unwrap_or(info.stats.total_runtime);
    }
}

fn collect_zombies(handle: &TaskHandle) {
    let zombie_max_age = handle.0.config.zombie_max_age;
    let children = handle.0.children.lock().clone();
    for weak in children {
        let Some(inner) = weak.upgrade() else { continue };
        let child = TaskHandle(inner);
        let is_zombie = {
            let info = child.0.info.lock();
            info.state.is_terminal()
                && info
                    .end_time
                    .is_some_and(|end| Utc::now().signed_duration_since(end).to_std().unwrap_or_default() > zombie_max_age)
        };
        if is_zombie {
            warn!(task = %handle.0.id, zombie = %child.0.id, name = %child.name(), "force-cleaning zombie child");
            let child_clone = child.clone();
            tokio::spawn(async move {
                child_clone.run_cleanup(TaskState::Cancelled).await;
            });
        }
    }
}

async fn check_limits(handle: &TaskHandle) {
    let (limits, stats) = {
        let info = handle.0.info.lock();
        (info.limits, info.stats)
    };

    let crossing = if let Some(max) = limits.max_runtime {
        (stats.total_runtime > max).then_some("runtime")
    } else {
        None
    }
    .or_else(|| {
        limits
            .max_memory
            .filter(|&max| stats.peak_memory > max)
            .map(|_| "memory")
    })
    .or_else(|| {
        limits
            .max_io_ops
            .filter(|&max| stats.io_operations > max)
            .map(|_| "io_operations")
    })
    .or_else(|| {
        limits
            .max_network_calls
            .filter(|&max| stats.network_calls > max)
            .map(|_| "network_calls")
    })
    .or_else(|| {
        limits
            .max_children
            .filter(|&max| stats.child_tasks > max)
            .map(|_| "children")
    });

    if let Some(which) = crossing {
        let reason = format!("Resource exceeded: {which}");
        warn!(task = %handle.0.id, name = %handle.name(), %reason, "resource limit crossed");
        handle.cancel(true, None, Some(reason)).await;
    }
}

fn check_starvation(handle: &TaskHandle) {
    let mut info = handle.0.info.lock();
    if info.state != TaskState::Blocked {
        return;
    }
    let idle = Utc::now()
        .signed_duration_since(info.last_active)
        .to_std()
        .unwrap_or_default();
    if idle > info.starvation_threshold {
        info.debug_info.insert(debug_keys::STARVING.into(), "true".into());
        warn!(task = %handle.0.id, name = %info.name, "task starving");
    }
}

async fn scan_deadlocks(handle: &TaskHandle) {
    if let Some(cycle) = deadlock::scan_subtree(handle) {
        warn!(task = %handle.0.id, cycle = ?cycle, "deadlock detected; cancelling cycle");
        for weak in collect_cycle_handles(handle, &cycle) {
            if let Some(inner) = weak.upgrade() {
                TaskHandle(inner).cancel(true, None, Some("Deadlock".into())).await;
            }
        }
    }
}

fn collect_cycle_handles(root: &TaskHandle, cycle: &[TaskId]) -> Vec<Weak<crate::handle::Inner>> {
    let mut found = Vec::new();
    let mut stack = vec![root.clone()];
    let mut seen = std::collections::HashSet::new();
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id()) {
            continue;
        }
        if cycle.contains(&node.id()) {
            found.push(std::sync::Arc::downgrade(&node.0));
        }
        for dep in node
            .0
            .dependencies
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(TaskHandle)
        {
            stack.push(dep);
        }
        for child in node.children() {
            stack.push(child);
        }
    }
    found
}

/// DFS-based cycle detection over the dependency graph.
pub(crate) mod deadlock {
    use super::*;
    use std::collections::HashSet;

    /// Returns the path `other -> ... -> dependent` if adding the edge
    /// `dependent -> other` (dependent depends on other) would close a
    /// cycle, i.e. if `dependent` is already reachable from `other` by
    /// following existing dependency edges.
    pub(crate) fn would_cycle(other: &TaskHandle, dependent: &TaskHandle) -> Option<Vec<TaskId>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        dfs(other, dependent.id(), &mut visited, &mut path)
    }

    fn dfs(
        node: &TaskHandle,
        target: TaskId,
        visited: &mut HashSet<TaskId>,
        path: &mut Vec<TaskId>,
    ) -> Option<Vec<TaskId>> {
        if !visited.insert(node.id()) {
            return None;
        }
        path.push(node.id());
        if node.id() == target {
            return Some(path.clone());
        }
        for dep in node
            .0
            .dependencies
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(TaskHandle)
            .collect::<Vec<_>>()
        {
            if let Some(found) = dfs(&dep, target, visited, path) {
                return Some(found);
            }
        }
        path.pop();
        None
    }

    /// Scans the dependency graph reachable from `root` (its own
    /// dependencies, transitively) for a cycle; returns the cycle's task
    /// ids if one is found.
    pub(crate) fn scan_subtree(root: &TaskHandle) -> Option<Vec<TaskId>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        scan(root, &mut visited, &mut path)
    }

    fn scan(
        node: &TaskHandle,
        visited: &mut HashSet<TaskId>,
        path: &mut Vec<TaskId>,
    ) -> Option<Vec<TaskId>> {
        if let Some(pos) = path.iter().position(|id| *id == node.id()) {
            return Some(path[pos..].to_vec());
        }
        if !visited.insert(node.id()) {
            return None;
        }
        path.push(node.id());
        for dep in node
            .0
            .dependencies
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(TaskHandle)
            .collect::<Vec<_>>()
        {
            if let Some(found) = scan(&dep, visited, path) {
                return Some(found);
            }
        }
        path.pop();
        None
    }
}
