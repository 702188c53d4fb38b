//! The stamp capability every network element implements.

use num_complex::Complex64;
use std::fmt;

use crate::error::{Error, Result};
use crate::mna::StampBuffer;
use crate::node::NodeId;
use crate::unknowns::{SolutionView, StampContext};

/// Identifier of a component inside a [`SystemTopology`](crate::SystemTopology).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    pub fn new(id: u32) -> Self {
        ComponentId(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A discrete change requested by a switch event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventAction {
    /// Open (`false`) or close (`true`) a switching element.
    SetClosed(bool),
    /// Change a named numeric parameter.
    SetParameter { name: String, value: f64 },
    /// Take the component out of the topology.
    Remove,
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventAction::SetClosed(true) => write!(f, "close"),
            EventAction::SetClosed(false) => write!(f, "open"),
            EventAction::SetParameter { name, value } => write!(f, "set {name}={value}"),
            EventAction::Remove => write!(f, "remove"),
        }
    }
}

/// What an applied event invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventEffect {
    /// Nothing observable changed.
    None,
    /// Matrix or source values changed; connectivity did not.
    Values,
    /// Connectivity or the component set changed.
    Topology,
}

impl EventEffect {
    /// Combine the effects of two events applied in the same step.
    pub fn merge(self, other: EventEffect) -> EventEffect {
        self.max(other)
    }
}

/// Capability implemented by every electrical element.
///
/// `stamp` receives `&self` and writes only into the component's own
/// [`StampBuffer`], so stamps of different components can run concurrently.
/// State carried between steps (companion-model history) is updated in
/// `post_step` once the step's solution is known.
pub trait Component: fmt::Debug + Send + Sync {
    /// Unique name within the topology.
    fn name(&self) -> &str;

    /// Terminal nodes, ground included.
    fn nodes(&self) -> Vec<NodeId>;

    /// Number of branch-current unknowns this component adds.
    fn branch_count(&self) -> usize {
        0
    }

    /// Add this component's matrix and right-hand-side contributions.
    fn stamp(&self, buffer: &mut StampBuffer, ctx: &StampContext<'_>) -> Result<()>;

    /// Whether `post_step` does any work. Components returning `false` get
    /// no post-step task.
    fn has_post_step(&self) -> bool {
        false
    }

    /// Update internal state from the solved step.
    fn post_step(&mut self, _solution: &SolutionView<'_>, _ctx: &StampContext<'_>) {}

    /// React to a switch or parameter event.
    fn apply_event(&mut self, action: &EventAction) -> Result<EventEffect> {
        Err(Error::UnsupportedEvent {
            component: self.name().to_string(),
            action: action.to_string(),
        })
    }

    /// Current through the component after the last step, if it tracks one.
    fn current(&self) -> Option<Complex64> {
        None
    }
}
