//! Error types for switchyard-sched.

use thiserror::Error;

/// Error returned by a task body.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("task graph contains a cycle through: {}", tasks.join(", "))]
    Cycle { tasks: Vec<String> },

    #[error("task '{task}' depends on unknown task {dependency}")]
    InvalidDependency { task: String, dependency: usize },

    #[error("task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: TaskError,
    },

    #[error("task '{task}' panicked: {message}")]
    TaskPanicked { task: String, message: String },

    #[error("failed to start worker pool: {0}")]
    ThreadPool(String),

    #[error("invalid topology: {0}")]
    Topology(#[from] switchyard_core::Error),
}

pub type Result<T> = std::result::Result<T, SchedulingError>;
