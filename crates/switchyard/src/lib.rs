//! # Switchyard
//!
//! Fixed-step time-domain simulation of switching electrical networks.
//!
//! Switchyard provides:
//! - EMT (instantaneous) and DP (dynamic phasor) network models
//! - Modified nodal analysis with per-component stamp buffers
//! - Dense, sparse and optional CUDA linear solvers behind one trait
//! - Factor reuse across steps until the system matrix changes
//! - Sequential or parallel execution of each step's task graph
//! - Timed switch, parameter and removal events
//!
//! ## Quick Start
//!
//! ```rust
//! use switchyard::prelude::*;
//!
//! let mut topo = SystemTopology::new(Domain::Emt, 50.0);
//! let n1 = topo.add_node("n1");
//! let n2 = topo.add_node("n2");
//! topo.add(VoltageSource::dc("V1", n1, NodeId::GROUND, 10.0)).unwrap();
//! topo.add(Resistor::new("R1", n1, n2, 1000.0)).unwrap();
//! let s1 = topo
//!     .add(Switch::new("S1", n2, NodeId::GROUND, 1e9, 1e-3, false))
//!     .unwrap();
//!
//! let mut sim = Simulation::new(topo, SimulationConfig::new(1e-3, 1e-2)).unwrap();
//! sim.add_event(SwitchEvent::close(5e-3, s1));
//! let summary = sim.run().unwrap();
//! assert_eq!(summary.steps, 10);
//! ```
//!
//! ## Features
//!
//! - `cuda` - CUDA dense LU and sparse QR backends (requires an NVIDIA driver)

pub use switchyard_core as core;
pub use switchyard_devices as devices;
pub use switchyard_sched as sched;
pub use switchyard_sim as sim;
pub use switchyard_solver as solver;

#[cfg(feature = "cuda")]
pub use switchyard_backend_cuda as backend_cuda;

// ============================================================================
// Network model
// ============================================================================

pub use switchyard_core::{
    Component, ComponentId, Domain, Error as CoreError, EventAction, EventEffect, MnaSystem,
    Node, NodeId, SolutionView, StampBuffer, StampContext, SystemTopology, UnknownMap,
};

pub use switchyard_devices::{
    Capacitor, CurrentSource, Inductor, Resistor, Sinusoid, Switch, VoltageSource,
};

// ============================================================================
// Solvers and scheduling
// ============================================================================

pub use switchyard_solver::{
    AutoSolver, BackendKind, CachedSolver, DenseLu, Error as SolverError, FallbackSolver,
    LinearSolver, Refresh, SolverConfig, SolverStats, SparseLu,
};

pub use switchyard_sched::{
    ParallelScheduler, Scheduler, SchedulerKind, SchedulingError, SequentialScheduler, TaskGraph,
};

// ============================================================================
// Simulation
// ============================================================================

pub use switchyard_sim::{
    CsvLogger, DataLogger, ErrorKind, EventManager, MemoryLogger, RunSummary, Simulation,
    SimulationConfig, SimulationError, SimulationStats, StepResults, StopReason, SwitchEvent,
};

/// Re-export of nalgebra's dynamic vector type.
pub use nalgebra::DVector;

/// Re-export of num_complex's double-precision complex type.
pub use num_complex::Complex64;

/// Prelude module containing commonly used types and traits.
///
/// ```rust
/// use switchyard::prelude::*;
/// ```
pub mod prelude {
    // Network
    pub use crate::{Component, ComponentId, Domain, NodeId, SystemTopology};

    // Devices
    pub use crate::{
        Capacitor, CurrentSource, Inductor, Resistor, Sinusoid, Switch, VoltageSource,
    };

    // Configuration
    pub use crate::{BackendKind, SchedulerKind, SimulationConfig, SolverConfig};

    // Running
    pub use crate::{
        CsvLogger, DataLogger, MemoryLogger, Simulation, SimulationError, StepResults, SwitchEvent,
    };

    pub use crate::Complex64;
}
