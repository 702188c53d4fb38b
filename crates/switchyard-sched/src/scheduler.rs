//! Execution of a [`TaskGraph`] once per time step.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulingError, TaskError};
use crate::graph::TaskGraph;
use crate::task::{Task, TaskId};

/// The work behind each task, supplied by the caller.
///
/// `run` may be called from several threads at once for tasks of the same
/// level, so implementations synchronize any state tasks share.
pub trait TaskRunner: Sync {
    fn run(&self, task: &Task) -> std::result::Result<(), TaskError>;
}

/// Runs every task of a graph exactly once, respecting dependencies.
///
/// On failure no further levels are started and the error names the
/// failing task.
pub trait Scheduler: fmt::Debug + Send {
    fn execute(&self, graph: &TaskGraph, runner: &dyn TaskRunner) -> Result<()>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Which scheduler a simulation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// Single thread, deterministic order.
    #[default]
    Sequential,
    /// Worker pool; `threads == 0` uses one thread per core.
    Parallel { threads: usize },
}

impl SchedulerKind {
    pub fn build(self) -> Result<Box<dyn Scheduler>> {
        match self {
            SchedulerKind::Sequential => Ok(Box::new(SequentialScheduler)),
            SchedulerKind::Parallel { threads } => Ok(Box::new(ParallelScheduler::new(threads)?)),
        }
    }
}

/// Run one task, turning errors and panics into [`SchedulingError`].
fn run_task(runner: &dyn TaskRunner, task: &Task) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(|| runner.run(task))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(SchedulingError::TaskFailed {
            task: task.name.clone(),
            source,
        }),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(SchedulingError::TaskPanicked {
                task: task.name.clone(),
                message,
            })
        }
    }
}

/// Executes the graph in topological order on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialScheduler;

impl Scheduler for SequentialScheduler {
    fn execute(&self, graph: &TaskGraph, runner: &dyn TaskRunner) -> Result<()> {
        for task in graph.order() {
            run_task(runner, task)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// Executes each level of the graph across a rayon worker pool.
///
/// The end of a level is a barrier. After a failure, tasks of the same level
/// that have not started yet are skipped and the failure with the lowest
/// task id is reported.
pub struct ParallelScheduler {
    pool: rayon::ThreadPool,
}

impl fmt::Debug for ParallelScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelScheduler")
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl ParallelScheduler {
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("switchyard-worker-{i}"))
            .build()
            .map_err(|e| SchedulingError::ThreadPool(e.to_string()))?;
        log::info!(
            "parallel scheduler started with {} threads",
            pool.current_num_threads()
        );
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Scheduler for ParallelScheduler {
    fn execute(&self, graph: &TaskGraph, runner: &dyn TaskRunner) -> Result<()> {
        let abort = AtomicBool::new(false);

        for level in graph.levels() {
            let failures: Vec<(TaskId, SchedulingError)> = self.pool.install(|| {
                level
                    .par_iter()
                    .filter_map(|&id| {
                        if abort.load(Ordering::Acquire) {
                            return None;
                        }
                        let task = graph.task(id)?;
                        run_task(runner, task).err().map(|e| {
                            abort.store(true, Ordering::Release);
                            (id, e)
                        })
                    })
                    .collect()
            });

            if let Some((_, err)) = failures.into_iter().min_by_key(|(id, _)| *id) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}
