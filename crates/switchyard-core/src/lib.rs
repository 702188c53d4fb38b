//! Core network representation and MNA structures for switchyard.
//!
//! This crate owns the [`SystemTopology`] (nodes and components), the
//! [`Component`] stamp capability, the unknown layout of a topology
//! interval, and the partitioned [`StampBuffer`] / [`MnaSystem`] assembly.

pub mod component;
pub mod domain;
pub mod error;
pub mod mna;
pub mod node;
pub mod topology;
pub mod unknowns;

pub use component::{Component, ComponentId, EventAction, EventEffect};
pub use domain::Domain;
pub use error::{Error, Result};
pub use mna::{MnaSystem, StampBuffer};
pub use node::{Node, NodeId};
pub use topology::SystemTopology;
pub use unknowns::{SolutionView, StampContext, UnknownMap};
