//! Network topology: the owner of every node and component.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::component::{Component, ComponentId, EventAction, EventEffect};
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::node::{Node, NodeId};
use crate::unknowns::UnknownMap;

/// Nodes and components of a network.
///
/// The topology is fixed between switch events. Other subsystems refer to
/// its contents through [`NodeId`] and [`ComponentId`] and never hold the
/// components themselves. Iteration follows insertion order, which is also
/// the stamp reduction order.
#[derive(Debug)]
pub struct SystemTopology {
    domain: Domain,
    /// Nominal system frequency in Hz.
    frequency: f64,
    nodes: IndexMap<NodeId, Node>,
    components: IndexMap<ComponentId, Box<dyn Component>>,
    next_node_id: u32,
    next_component_id: u32,
}

impl SystemTopology {
    /// Create an empty topology holding only the ground node.
    pub fn new(domain: Domain, frequency: f64) -> Self {
        let mut nodes = IndexMap::new();
        nodes.insert(NodeId::GROUND, Node::new(NodeId::GROUND, "gnd"));
        Self {
            domain,
            frequency,
            nodes,
            components: IndexMap::new(),
            next_node_id: 1, // 0 is reserved for ground
            next_component_id: 0,
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Add a named node, returning its id.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId::new(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(id, Node::new(id, name));
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.name() == name)
    }

    /// Iterate over all nodes except ground.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| !n.is_ground())
    }

    /// Number of nodes, excluding ground.
    pub fn node_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// Take ownership of a component. Node references are checked later,
    /// when the topology is indexed for a step.
    pub fn add_component(&mut self, component: Box<dyn Component>) -> Result<ComponentId> {
        if self.component_by_name(component.name()).is_some() {
            return Err(Error::DuplicateComponent(component.name().to_string()));
        }
        let id = ComponentId::new(self.next_component_id);
        self.next_component_id += 1;
        self.components.insert(id, component);
        Ok(id)
    }

    /// Convenience wrapper around [`add_component`](Self::add_component).
    pub fn add<C: Component + 'static>(&mut self, component: C) -> Result<ComponentId> {
        self.add_component(Box::new(component))
    }

    /// Remove a component, preserving the order of the rest.
    pub fn remove_component(&mut self, id: ComponentId) -> Result<Box<dyn Component>> {
        self.components
            .shift_remove(&id)
            .ok_or_else(|| Error::UnknownComponent(id.to_string()))
    }

    pub fn component(&self, id: ComponentId) -> Option<&dyn Component> {
        self.components.get(&id).map(|c| c.as_ref())
    }

    pub fn component_by_name(&self, name: &str) -> Option<ComponentId> {
        self.components
            .iter()
            .find(|(_, c)| c.name() == name)
            .map(|(id, _)| *id)
    }

    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &dyn Component)> {
        self.components.iter().map(|(id, c)| (*id, c.as_ref()))
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Borrow nodes and components mutably at the same time, both in
    /// insertion order. Ground is excluded from the nodes.
    #[allow(clippy::type_complexity)]
    pub fn split_mut(
        &mut self,
    ) -> (
        impl Iterator<Item = &mut Node>,
        impl Iterator<Item = (ComponentId, &mut Box<dyn Component>)>,
    ) {
        let nodes = self.nodes.values_mut().filter(|n| !n.is_ground());
        let components = self.components.iter_mut().map(|(id, c)| (*id, c));
        (nodes, components)
    }

    /// Apply an event action to a component.
    ///
    /// `Remove` is handled here; every other action is forwarded to the
    /// component, which reports what it invalidated.
    pub fn apply_event(&mut self, target: ComponentId, action: &EventAction) -> Result<EventEffect> {
        if *action == EventAction::Remove {
            let removed = self.remove_component(target)?;
            log::debug!("removed component {}", removed.name());
            return Ok(EventEffect::Topology);
        }
        let component = self
            .components
            .get_mut(&target)
            .ok_or_else(|| Error::UnknownComponent(target.to_string()))?;
        component.apply_event(action)
    }

    /// Assign matrix indices for the current interval.
    ///
    /// Fails when a component references a node that does not exist, when
    /// there is nothing to solve, or when part of the network has no path
    /// to ground. Nodes no component touches get no unknown.
    pub fn index(&self) -> Result<UnknownMap> {
        if self.components.is_empty() {
            return Err(Error::EmptyTopology);
        }

        let mut referenced = HashSet::new();
        for component in self.components.values() {
            for node in component.nodes() {
                if !self.nodes.contains_key(&node) {
                    return Err(Error::UnknownNode {
                        component: component.name().to_string(),
                        node,
                    });
                }
                if !node.is_ground() {
                    referenced.insert(node);
                }
            }
        }

        let mut map = UnknownMap::new(self.domain);
        for id in self.nodes.keys() {
            if referenced.contains(id) {
                map.push_node(*id);
            }
        }
        for (id, component) in &self.components {
            map.push_branches(*id, component.branch_count());
        }

        self.check_grounded(&map)?;
        Ok(map)
    }

    fn check_grounded(&self, map: &UnknownMap) -> Result<()> {
        let ground = map.num_nodes();
        let mut sets = DisjointSets::new(ground + 1);
        let slot = |id: NodeId| map.node(id).unwrap_or(ground);

        for component in self.components.values() {
            let nodes = component.nodes();
            if let Some((first, rest)) = nodes.split_first() {
                for other in rest {
                    sets.union(slot(*first), slot(*other));
                }
            }
        }

        let ground_root = sets.find(ground);
        for (id, index) in map.nodes() {
            if sets.find(index) != ground_root {
                let name = self
                    .nodes
                    .get(&id)
                    .map(|n| n.name().to_string())
                    .unwrap_or_else(|| id.to_string());
                return Err(Error::FloatingNode(name));
            }
        }
        Ok(())
    }
}

/// Union-find over matrix slots.
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}
