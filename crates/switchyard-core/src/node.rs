//! Network nodes.

use num_complex::Complex64;
use std::fmt;

/// Identifier of a node in a [`SystemTopology`](crate::SystemTopology).
///
/// Ids are handed out by the topology and never reused, so they stay valid
/// across switch events even though the matrix index behind them may move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// The ground (reference) node.
    pub const GROUND: NodeId = NodeId(0);

    /// Create a NodeId from a raw value.
    pub fn new(id: u32) -> Self {
        NodeId(id)
    }

    /// Raw id value.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_ground(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A node of the network together with its most recent solution.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    name: String,
    /// Voltage from the last solved step. Real-valued domains leave the
    /// imaginary part at zero.
    voltage: Complex64,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            voltage: Complex64::new(0.0, 0.0),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ground(&self) -> bool {
        self.id.is_ground()
    }

    /// Voltage written back by the most recent step.
    pub fn voltage(&self) -> Complex64 {
        self.voltage
    }

    /// Overwrite the stored voltage. Called by the scatter stage of a step.
    pub fn set_voltage(&mut self, voltage: Complex64) {
        self.voltage = voltage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_node() {
        assert!(NodeId::GROUND.is_ground());
        assert_eq!(NodeId::GROUND.as_u32(), 0);
        assert_eq!(NodeId::GROUND.to_string(), "GND");
    }

    #[test]
    fn test_node_id() {
        let id = NodeId::new(42);
        assert!(!id.is_ground());
        assert_eq!(id.as_u32(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_node_voltage_roundtrip() {
        let mut node = Node::new(NodeId::new(1), "bus1");
        assert_eq!(node.name(), "bus1");
        assert_eq!(node.voltage(), Complex64::new(0.0, 0.0));

        node.set_voltage(Complex64::new(1.5, -0.5));
        assert_eq!(node.voltage(), Complex64::new(1.5, -0.5));
    }
}
