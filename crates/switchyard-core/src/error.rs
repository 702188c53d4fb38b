//! Error types for switchyard-core.

use thiserror::Error;

use crate::node::NodeId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("component {component} references unknown node {node}")]
    UnknownNode { component: String, node: NodeId },

    #[error("component not found: {0}")]
    UnknownComponent(String),

    #[error("duplicate component: {0}")]
    DuplicateComponent(String),

    #[error("node {0} has no path to ground")]
    FloatingNode(String),

    #[error("topology has no components")]
    EmptyTopology,

    #[error("component {name}: {message}")]
    Component { name: String, message: String },

    #[error("component {component} does not support event {action}")]
    UnsupportedEvent { component: String, action: String },

    #[error("component {component} has no parameter {parameter}")]
    InvalidParameter { component: String, parameter: String },

    #[error("stamp index {index} outside system of size {size}")]
    StampOutOfRange { index: usize, size: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
