//! # asyn-rt - Structured Concurrency Supervisor
//!
//! A tree of named, supervised task handles with a strict lifecycle state
//! machine, parent-to-child ownership, cancellation propagation, dependency
//! tracking with deadlock detection, resource-limit enforcement, and
//! structured-concurrency combinators on top of Tokio.
//!
//! # Quick Start
//!
//! ```rust
//! use asyn_rt::{Runtime, TaskHandle};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let root = TaskHandle::root("app", Runtime::current());
//! let worker = root.new_child("worker", asyn_rt::Priority::Normal)?;
//! let result: Result<u32, std::io::Error> = worker.run(async { Ok(42) }).await
//!     .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
//! assert_eq!(result?, 42);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! ## Supervision tree
//! - [`handle`] - `TaskHandle`, `ScopeGuard`, and the cleanup protocol
//! - [`state`] - `TaskState` and `Priority`
//! - [`info`] - `TaskInfo` snapshot types, resource stats/limits, cleanup callbacks
//! - [`monitor`] - periodic zombie/limit/starvation/deadlock sweep
//! - [`group`] - `TaskGroup` fan-out/fan-in with aggregated failures
//! - [`combinators`] - `gather`, `wait`, `as_completed`, `shield`, `wait_for`, `timeout`
//!
//! ## Infrastructure
//! - [`runtime`] - thin pass-through façade over the external async runtime
//! - [`config`] - `SupervisorConfig` and its builder
//! - [`probe`] - injectable resource sampling
//! - [`error`] - `SupervisorError`, `RunError`, `AggregateError`
//! - [`util`] - `TaskId` and serde helpers
//!
//! # Architecture Principles
//!
//! - **3-layer import organization** (std -> third-party -> internal)
//! - **chrono `DateTime<Utc>`** for all timestamps
//! - **Explicit runtime handle**: no ambient/global event loop
//! - **parking_lot mutexes** guard every mutable field shared across tasks

pub mod combinators;
pub mod config;
pub mod error;
pub mod group;
pub mod handle;
pub mod info;
pub mod monitor;
pub mod probe;
pub mod prelude;
pub mod runtime;
pub mod state;
pub mod util;

pub use config::SupervisorConfig;
pub use error::{AggregateError, RunError, SupervisorError};
pub use group::TaskGroup;
pub use handle::{ScopeGuard, TaskHandle};
pub use info::{ResourceLimits, ResourceStats, TaskSnapshot, TaskTreeNode};
pub use probe::{ProbeSample, ResourceProbe};
pub use runtime::Runtime;
pub use state::{Priority, TaskState};
pub use util::TaskId;
