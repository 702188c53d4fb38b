//! Simulation configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchyard_sched::SchedulerKind;
use switchyard_solver::SolverConfig;

use crate::error::{Result, SimulationError};

/// Run-level settings for a [`Simulation`](crate::Simulation).
///
/// Every field has a default, so JSON configurations only need to name
/// what they change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed step size in seconds.
    pub time_step: f64,
    /// Steps run while `t < final_time`.
    pub final_time: f64,
    pub solver: SolverConfig,
    pub scheduler: SchedulerKind,
    /// Stop after this many steps, even before `final_time`.
    pub max_steps: Option<u64>,
    /// Stop once a run has taken this long.
    pub max_wall_time: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_step: 1e-4,
            final_time: 0.1,
            solver: SolverConfig::default(),
            scheduler: SchedulerKind::Sequential,
            max_steps: None,
            max_wall_time: None,
        }
    }
}

impl SimulationConfig {
    pub fn new(time_step: f64, final_time: f64) -> Self {
        Self {
            time_step,
            final_time,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SimulationError::config(0.0, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_max_wall_time(mut self, limit: Duration) -> Self {
        self.max_wall_time = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(SimulationError::config(
                0.0,
                format!("time step must be positive, got {}", self.time_step),
            ));
        }
        if !(self.final_time.is_finite() && self.final_time >= 0.0) {
            return Err(SimulationError::config(
                0.0,
                format!("final time must be non-negative, got {}", self.final_time),
            ));
        }
        if self.solver.sparse_threshold == 0 {
            return Err(SimulationError::config(0.0, "sparse threshold must be at least 1"));
        }
        Ok(())
    }

    /// Number of steps needed to reach `final_time`.
    pub fn step_count(&self) -> u64 {
        (self.final_time / self.time_step - 1e-9).ceil().max(0.0) as u64
    }
}
