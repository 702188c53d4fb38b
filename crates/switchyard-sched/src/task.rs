//! Units of work executed once per time step.

use std::fmt;
use switchyard_core::ComponentId;

/// Position of a task inside its [`TaskGraph`](crate::TaskGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// What a task does when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Write one component's contribution into its own stamp buffer.
    Stamp(ComponentId),
    /// Assemble all stamp buffers and solve the linear system.
    Solve,
    /// Update one component's history from the solution.
    PostStep(ComponentId),
    /// Write solved node voltages back into the topology.
    Scatter,
}

impl TaskKind {
    /// Component the task acts on, if any.
    pub fn component(&self) -> Option<ComponentId> {
        match self {
            TaskKind::Stamp(id) | TaskKind::PostStep(id) => Some(*id),
            TaskKind::Solve | TaskKind::Scatter => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub kind: TaskKind,
    /// Tasks that must complete before this one starts.
    pub deps: Vec<TaskId>,
}
