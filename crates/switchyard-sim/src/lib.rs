//! Event manager and timestep driver for switchyard.
//!
//! A [`Simulation`] owns a [`SystemTopology`](switchyard_core::SystemTopology),
//! a cached linear solver and a scheduler. Each call to
//! [`Simulation::step`] applies due [`SwitchEvent`]s, rebuilds the task
//! graph when the topology changed, and runs stamp, solve and post-step
//! tasks for one time step.

pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod logger;
mod step;

pub use config::SimulationConfig;
pub use driver::{RunSummary, Simulation, SimulationStats, StopReason};
pub use error::{ErrorKind, Result, SimulationError};
pub use event::{EventManager, SwitchEvent};
pub use logger::{CsvLogger, DataLogger, MemoryLogger, StepResults};
pub use switchyard_sched::SchedulerKind;
pub use switchyard_solver::SolverConfig;
