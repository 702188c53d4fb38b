//! Error types for switchyard-sim.

use switchyard_sched::SchedulingError;
use thiserror::Error;

/// A fatal condition, tagged with the simulation time it occurred at.
#[derive(Debug, Error)]
#[error("at t={time}s: {kind}")]
pub struct SimulationError {
    pub time: f64,
    #[source]
    pub kind: ErrorKind,
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("scheduling error: {0}")]
    Scheduling(SchedulingError),

    #[error("solver error: {0}")]
    Solver(switchyard_solver::Error),

    #[error("system error: {0}")]
    System(switchyard_core::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("data logger failed: {0}")]
    Logger(String),
}

impl SimulationError {
    pub fn new(time: f64, kind: ErrorKind) -> Self {
        Self { time, kind }
    }

    pub(crate) fn config(time: f64, message: impl Into<String>) -> Self {
        Self::new(time, ErrorKind::Config(message.into()))
    }

    /// Classify a scheduler failure.
    ///
    /// Solver and topology errors raised inside a task are unwrapped so the
    /// caller sees the numerical or system class rather than a generic task
    /// failure.
    pub fn from_scheduling(time: f64, err: SchedulingError) -> Self {
        let kind = match err {
            SchedulingError::Topology(e) => ErrorKind::System(e),
            SchedulingError::TaskFailed { task, source } => {
                match source.downcast::<switchyard_solver::Error>() {
                    Ok(e) => ErrorKind::Solver(*e),
                    Err(source) => match source.downcast::<switchyard_core::Error>() {
                        Ok(e) => ErrorKind::System(*e),
                        Err(source) => {
                            ErrorKind::Scheduling(SchedulingError::TaskFailed { task, source })
                        }
                    },
                }
            }
            other => ErrorKind::Scheduling(other),
        };
        Self::new(time, kind)
    }

    pub fn is_solver(&self) -> bool {
        matches!(self.kind, ErrorKind::Solver(_))
    }

    pub fn is_system(&self) -> bool {
        matches!(self.kind, ErrorKind::System(_))
    }

    pub fn is_scheduling(&self) -> bool {
        matches!(self.kind, ErrorKind::Scheduling(_))
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
