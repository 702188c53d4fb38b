//! Task graph construction and level computation.
//!
//! A graph is built once per topology interval. [`TaskGraph::build`] turns
//! a [`SystemTopology`] into:
//!
//! ```text
//!   stamp(c0)  stamp(c1) ... stamp(cn)      level 0
//!        \         |          /
//!                solve                      level 1
//!        /         |          \
//!   post(c0)  post(c2) ...   scatter        level 2
//! ```
//!
//! Stamp tasks write disjoint buffers, so every task within a level can run
//! concurrently; the level boundary is the only synchronization point.

use switchyard_core::{SystemTopology, UnknownMap};

use crate::error::{Result, SchedulingError};
use crate::task::{Task, TaskId, TaskKind};

/// Incremental construction of a [`TaskGraph`].
///
/// Dependencies may reference tasks added later; they are validated by
/// [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct TaskGraphBuilder {
    tasks: Vec<Task>,
    dangling: Vec<(TaskId, usize)>,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task and return its id.
    pub fn add(&mut self, name: impl Into<String>, kind: TaskKind) -> TaskId {
        let id = TaskId(self.tasks.len());
        self.tasks.push(Task {
            id,
            name: name.into(),
            kind,
            deps: Vec::new(),
        });
        id
    }

    /// Make `task` wait for `dependency`.
    pub fn depend(&mut self, task: TaskId, dependency: TaskId) {
        self.depend_on_index(task, dependency.0);
    }

    /// Make `task` wait for the task at position `dependency`, which does
    /// not have to exist yet.
    pub fn depend_on_index(&mut self, task: TaskId, dependency: usize) {
        match self.tasks.get_mut(task.0) {
            Some(t) => t.deps.push(TaskId(dependency)),
            None => self.dangling.push((task, dependency)),
        }
    }

    /// Validate the graph and compute its execution levels.
    pub fn finish(self) -> Result<TaskGraph> {
        if let Some(&(task, dependency)) = self.dangling.first() {
            return Err(SchedulingError::InvalidDependency {
                task: task.to_string(),
                dependency,
            });
        }
        let n = self.tasks.len();
        for task in &self.tasks {
            if let Some(dep) = task.deps.iter().find(|d| d.0 >= n) {
                return Err(SchedulingError::InvalidDependency {
                    task: task.name.clone(),
                    dependency: dep.0,
                });
            }
        }

        let levels = levels(&self.tasks)?;
        Ok(TaskGraph {
            tasks: self.tasks,
            levels,
            unknowns: None,
        })
    }
}

/// Kahn's algorithm, grouping tasks whose dependencies are all satisfied
/// into the same level. Tasks within a level keep id order.
fn levels(tasks: &[Task]) -> Result<Vec<Vec<TaskId>>> {
    let n = tasks.len();
    let mut indegree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for task in tasks {
        for dep in &task.deps {
            indegree[task.id.0] += 1;
            dependents[dep.0].push(task.id.0);
        }
    }

    let mut current: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut levels = Vec::new();
    let mut placed = 0;
    while !current.is_empty() {
        placed += current.len();
        let mut next = Vec::new();
        for &i in &current {
            for &d in &dependents[i] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    next.push(d);
                }
            }
        }
        next.sort_unstable();
        levels.push(current.into_iter().map(TaskId).collect());
        current = next;
    }

    if placed < n {
        let tasks = tasks
            .iter()
            .filter(|t| indegree[t.id.0] > 0)
            .map(|t| t.name.clone())
            .collect();
        return Err(SchedulingError::Cycle { tasks });
    }
    Ok(levels)
}

/// Tasks of one topology interval, grouped into dependency levels.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    levels: Vec<Vec<TaskId>>,
    unknowns: Option<UnknownMap>,
}

impl TaskGraph {
    /// Build the per-step graph for `topology`.
    ///
    /// Validates the topology first, so a malformed network fails here,
    /// before anything is stamped or solved.
    pub fn build(topology: &SystemTopology) -> Result<Self> {
        let unknowns = topology.index()?;

        let mut builder = TaskGraphBuilder::new();
        let stamps: Vec<TaskId> = topology
            .components()
            .map(|(id, c)| builder.add(format!("stamp {}", c.name()), TaskKind::Stamp(id)))
            .collect();

        let solve = builder.add("solve", TaskKind::Solve);
        for &stamp in &stamps {
            builder.depend(solve, stamp);
        }

        for (id, component) in topology.components() {
            if component.has_post_step() {
                let post = builder.add(
                    format!("post-step {}", component.name()),
                    TaskKind::PostStep(id),
                );
                builder.depend(post, solve);
            }
        }
        let scatter = builder.add("scatter", TaskKind::Scatter);
        builder.depend(scatter, solve);

        let mut graph = builder.finish()?;
        log::debug!(
            "built task graph: {} tasks in {} levels, {} unknowns",
            graph.len(),
            graph.levels.len(),
            unknowns.system_size()
        );
        graph.unknowns = Some(unknowns);
        Ok(graph)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks grouped by dependency depth; every task's dependencies sit in
    /// earlier levels.
    pub fn levels(&self) -> &[Vec<TaskId>] {
        &self.levels
    }

    /// All tasks in a valid sequential order.
    pub fn order(&self) -> impl Iterator<Item = &Task> {
        self.levels.iter().flatten().map(|id| &self.tasks[id.0])
    }

    /// Unknown layout of the topology the graph was built from. `None` for
    /// graphs assembled by hand.
    pub fn unknowns(&self) -> Option<&UnknownMap> {
        self.unknowns.as_ref()
    }
}
