//! Per-step task graph and schedulers for switchyard.
//!
//! Each simulation step is a small DAG: one stamp task per component, a
//! solve task, then post-step updates and the voltage scatter. The graph is
//! rebuilt only when the topology changes; a [`Scheduler`] runs it once per
//! step through a caller-supplied [`TaskRunner`].

pub mod error;
pub mod graph;
pub mod scheduler;
pub mod task;

pub use error::{Result, SchedulingError, TaskError};
pub use graph::{TaskGraph, TaskGraphBuilder};
pub use scheduler::{
    ParallelScheduler, Scheduler, SchedulerKind, SequentialScheduler, TaskRunner,
};
pub use task::{Task, TaskId, TaskKind};
