//! Mapping from topology entities to rows of the system matrix.

use indexmap::IndexMap;
use nalgebra::DVector;
use num_complex::Complex64;

use crate::component::ComponentId;
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::node::NodeId;

/// Unknown layout of one topology interval.
///
/// Node voltages occupy indices `0..num_nodes` in node insertion order,
/// followed by branch currents in component order. In the DP domain every
/// unknown `u` is split into a real row `u` and an imaginary row `u + len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownMap {
    domain: Domain,
    nodes: IndexMap<NodeId, usize>,
    /// First branch index and branch count per component.
    branches: IndexMap<ComponentId, (usize, usize)>,
    num_branches: usize,
}

impl UnknownMap {
    pub(crate) fn new(domain: Domain) -> Self {
        Self {
            domain,
            nodes: IndexMap::new(),
            branches: IndexMap::new(),
            num_branches: 0,
        }
    }

    pub(crate) fn push_node(&mut self, id: NodeId) {
        let index = self.nodes.len();
        self.nodes.insert(id, index);
    }

    /// Must be called after every node has been pushed.
    pub(crate) fn push_branches(&mut self, component: ComponentId, count: usize) {
        if count == 0 {
            return;
        }
        let first = self.nodes.len() + self.num_branches;
        self.branches.insert(component, (first, count));
        self.num_branches += count;
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Number of complex (or real, in EMT) unknowns.
    pub fn len(&self) -> usize {
        self.nodes.len() + self.num_branches
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension of the real system handed to the solver.
    pub fn system_size(&self) -> usize {
        self.len() * self.domain.width()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_branches(&self) -> usize {
        self.num_branches
    }

    /// Matrix index of a node, `None` for ground or an unconnected node.
    pub fn node(&self, id: NodeId) -> Option<usize> {
        if id.is_ground() {
            return None;
        }
        self.nodes.get(&id).copied()
    }

    /// Matrix index of the `k`-th branch current owned by `component`.
    pub fn branch(&self, component: ComponentId, k: usize) -> Option<usize> {
        self.branches
            .get(&component)
            .filter(|(_, count)| k < *count)
            .map(|(first, _)| first + k)
    }

    /// Indexed nodes in index order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, usize)> + '_ {
        self.nodes.iter().map(|(id, index)| (*id, *index))
    }

    /// Read unknown `index` out of a real solution vector.
    pub fn value(&self, solution: &DVector<f64>, index: usize) -> Complex64 {
        match self.domain {
            Domain::Emt => Complex64::new(solution[index], 0.0),
            Domain::Dp => Complex64::new(solution[index], solution[index + self.len()]),
        }
    }
}

/// Per-component view of the step being stamped.
#[derive(Debug, Clone, Copy)]
pub struct StampContext<'a> {
    /// Simulation time of the step being solved, in seconds.
    pub time: f64,
    /// Step size in seconds.
    pub time_step: f64,
    /// Nominal system frequency in Hz.
    pub system_frequency: f64,
    unknowns: &'a UnknownMap,
    component: ComponentId,
}

impl<'a> StampContext<'a> {
    pub fn new(
        unknowns: &'a UnknownMap,
        component: ComponentId,
        time: f64,
        time_step: f64,
        system_frequency: f64,
    ) -> Self {
        Self {
            time,
            time_step,
            system_frequency,
            unknowns,
            component,
        }
    }

    pub fn domain(&self) -> Domain {
        self.unknowns.domain()
    }

    /// Angular frequency the phasors rotate at: zero in EMT.
    pub fn omega(&self) -> f64 {
        match self.domain() {
            Domain::Emt => 0.0,
            Domain::Dp => 2.0 * std::f64::consts::PI * self.system_frequency,
        }
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn unknowns(&self) -> &'a UnknownMap {
        self.unknowns
    }

    /// Matrix index of a terminal node, `None` for ground.
    pub fn node(&self, id: NodeId) -> Option<usize> {
        self.unknowns.node(id)
    }

    /// Matrix index of this component's `k`-th branch current.
    pub fn branch(&self, k: usize) -> Result<usize> {
        self.unknowns
            .branch(self.component, k)
            .ok_or_else(|| Error::Component {
                name: self.component.to_string(),
                message: format!("no branch current {k} allocated"),
            })
    }
}

/// Read access to a solved step, used by post-step updates.
#[derive(Debug, Clone, Copy)]
pub struct SolutionView<'a> {
    unknowns: &'a UnknownMap,
    solution: &'a DVector<f64>,
    component: ComponentId,
}

impl<'a> SolutionView<'a> {
    pub fn new(
        unknowns: &'a UnknownMap,
        solution: &'a DVector<f64>,
        component: ComponentId,
    ) -> Self {
        Self {
            unknowns,
            solution,
            component,
        }
    }

    /// Node voltage; ground reads as zero.
    pub fn voltage(&self, id: NodeId) -> Complex64 {
        match self.unknowns.node(id) {
            Some(index) => self.unknowns.value(self.solution, index),
            None => Complex64::new(0.0, 0.0),
        }
    }

    /// Voltage from `pos` to `neg`.
    pub fn voltage_across(&self, pos: NodeId, neg: NodeId) -> Complex64 {
        self.voltage(pos) - self.voltage(neg)
    }

    /// This component's `k`-th branch current, zero if it owns none.
    pub fn branch_current(&self, k: usize) -> Complex64 {
        match self.unknowns.branch(self.component, k) {
            Some(index) => self.unknowns.value(self.solution, index),
            None => Complex64::new(0.0, 0.0),
        }
    }
}
