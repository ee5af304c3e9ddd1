//! Supervision Tree Integration Tests
//!
//! End-to-end scenarios covering parent/child cleanup ordering, cancellation
//! cascades, dependency ordering, deadlock detection, resource-limit trips,
//! and `TaskGroup` failure aggregation.

// Layer 1: Standard library imports
use std::io;
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use asyn_rt::info::ResourceLimits;
use asyn_rt::probe::CountingProbe;
use asyn_rt::{Priority, Runtime, SupervisorConfig, SupervisorError, TaskGroup, TaskHandle, TaskState};

#[tokio::test]
async fn test_parent_completion_detaches_all_children() {
    let parent = TaskHandle::root("parent", Runtime::current());
    let c1 = parent.new_child("c1", Priority::Normal).unwrap();
    let c2 = parent.new_child("c2", Priority::Normal).unwrap();
    assert_eq!(parent.children().len(), 2);

    let _: Result<(), io::Error> = c1.run(async { Ok(()) }).await.map_err(|_| unreachable!());
    let _: Result<(), io::Error> = c2.run(async { Ok(()) }).await.map_err(|_| unreachable!());

    assert!(parent.children().is_empty());
    assert_eq!(c1.state(), TaskState::Completed);
    assert_eq!(c2.state(), TaskState::Completed);
}

#[tokio::test]
async fn test_cancellation_cascades_to_descendants() {
    let root = TaskHandle::root("root", Runtime::current());
    let mid = root.new_child("mid", Priority::Normal).unwrap();
    let leaf = mid.new_child("leaf", Priority::Normal).unwrap();

    root.cancel(true, None, Some("shutting down".into())).await;

    assert_eq!(root.state(), TaskState::Cancelled);
    assert_eq!(mid.state(), TaskState::Cancelled);
    assert_eq!(leaf.state(), TaskState::Cancelled);
}

#[tokio::test]
async fn test_dependent_blocks_then_unblocks_after_dependency_completes() {
    let root = TaskHandle::root("root", Runtime::current());
    let dependency = root.new_child("dependency", Priority::Normal).unwrap();
    let dependent = root.new_child("dependent", Priority::Normal).unwrap();

    dependent.add_dependency(&dependency).unwrap();

    let wait_handle = dependent.clone();
    let waiter = tokio::spawn(async move {
        wait_handle.wait_dependencies().await;
    });

    let _: Result<(), io::Error> = dependency.run(async { Ok(()) }).await.map_err(|_| unreachable!());

    waiter.await.unwrap();
    assert_eq!(dependency.state(), TaskState::Completed);
}

#[tokio::test]
async fn test_add_dependency_rejects_cycle() {
    let root = TaskHandle::root("root", Runtime::current());
    let a = root.new_child("a", Priority::Normal).unwrap();
    let b = root.new_child("b", Priority::Normal).unwrap();
    let c = root.new_child("c", Priority::Normal).unwrap();

    a.add_dependency(&b).unwrap();
    b.add_dependency(&c).unwrap();

    let err = c.add_dependency(&a).unwrap_err();
    assert!(matches!(err, SupervisorError::CycleDetected { .. }));
}

#[tokio::test]
async fn test_resource_limit_trip_cancels_task() {
    let probe = std::sync::Arc::new(CountingProbe::new());
    let config = SupervisorConfig::builder()
        .with_monitor_interval(Duration::from_millis(20))
        .build()
        .unwrap();
    let handle = TaskHandle::root_with("memory-heavy", Runtime::current(), config, probe.clone());
    handle.set_resource_limit(ResourceLimits {
        max_memory: Some(1024),
        ..Default::default()
    });

    probe.set_memory_bytes(4096);

    // Give the monitor loop a couple of sweeps to observe the crossed ceiling.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(handle.state(), TaskState::Cancelled);
}

#[tokio::test]
async fn test_task_group_aggregates_failures_and_cancels_siblings() {
    let root = TaskHandle::root("root", Runtime::current());
    let group = TaskGroup::new(&root);

    let ok = group
        .create_task(Some("ok".into()), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<(), io::Error>(())
        })
        .unwrap();
    group
        .create_task(Some("bad".into()), async {
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "exploded"))
        })
        .unwrap();

    let result = group.exit().await;
    let aggregate = result.unwrap_err();
    assert_eq!(aggregate.len(), 1);
    // The still-running sibling is cancelled rather than left to finish.
    assert_ne!(ok.state(), TaskState::Running);
}

#[tokio::test]
async fn test_scope_guard_runs_cleanup_on_finish() {
    let handle = TaskHandle::root("scoped", Runtime::current());
    let guard = handle.scope().await;
    assert_eq!(guard.handle().state(), TaskState::Running);
    guard.finish().await;
    assert_eq!(handle.state(), TaskState::Completed);
}
