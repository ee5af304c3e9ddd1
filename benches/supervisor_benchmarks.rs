//! Supervision Benchmarks
//!
//! Measures baseline performance of supervision-tree operations:
//! - Child handle spawn
//! - Small supervision tree fan-out
//! - Dependency edge insertion (deadlock-check overhead)

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

// Layer 1: Standard library imports
use std::hint::black_box;
use std::time::Duration;

// Layer 2: Third-party crate imports
use criterion::{criterion_group, criterion_main, Criterion};

// Layer 3: Internal module imports
use asyn_rt::{Priority, Runtime, TaskHandle};

fn task_handle_spawn(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");

    c.bench_function("task_handle_spawn", |b| {
        b.to_async(&rt).iter(|| async {
            let root = TaskHandle::root("bench-root", Runtime::current());
            let child = root
                .new_child("bench-child", Priority::Normal)
                .expect("failed to spawn child");
            black_box(child);
        });
    });
}

fn supervision_tree_small(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");

    c.bench_function("supervision_tree_small", |b| {
        b.to_async(&rt).iter(|| async {
            let parent = TaskHandle::root("bench-parent", Runtime::current());
            for i in 0..3 {
                let _ = parent
                    .new_child(format!("child-{i}"), Priority::Normal)
                    .expect("failed to spawn child");
            }
            black_box(parent.children().len());
        });
    });
}

fn dependency_edge_insert(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");

    c.bench_function("dependency_edge_insert", |b| {
        b.to_async(&rt).iter(|| async {
            let root = TaskHandle::root("bench-root", Runtime::current());
            let a = root.new_child("a", Priority::Normal).expect("spawn a");
            let b = root.new_child("b", Priority::Normal).expect("spawn b");
            a.add_dependency(&b).expect("add dependency");
            black_box(());
        });
    });
}

fn configure_criterion() -> Criterion {
    Criterion::default()
        .sample_size(30)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(2))
        .without_plots()
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets =
        task_handle_spawn,
        supervision_tree_small,
        dependency_edge_insert
}

criterion_main!(benches);
