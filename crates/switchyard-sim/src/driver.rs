//! Fixed-step simulation driver.
//!
//! Step `k` solves the network at `t = k * time_step`:
//!
//! 1. apply every event due at `t`, in time then insertion order
//! 2. rebuild the task graph if an event changed the topology
//! 3. run the graph: stamp, solve, post-step, scatter
//! 4. hand the results to every registered logger

use std::time::{Duration, Instant};

use serde::Serialize;
use switchyard_core::{EventEffect, StampBuffer, SystemTopology};
use switchyard_sched::{Scheduler, TaskGraph};
use switchyard_solver::{BackendKind, CachedSolver, SolverStats};

use crate::config::SimulationConfig;
use crate::error::{ErrorKind, Result, SimulationError};
use crate::event::{EventManager, SwitchEvent};
use crate::logger::{DataLogger, StepResults};
use crate::step::StepRunner;

/// Events within this fraction of a step after a step time fire at it.
const EVENT_TOLERANCE: f64 = 1e-6;

/// Why [`Simulation::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    FinalTime,
    MaxSteps,
    WallClock,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Steps taken by this call.
    pub steps: u64,
    /// Simulation time reached, in seconds.
    pub final_time: f64,
    pub stop_reason: StopReason,
    pub wall_time: Duration,
}

/// Counters over the lifetime of a simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    pub steps: u64,
    pub graph_builds: u64,
    pub events_applied: u64,
    /// Wall time spent inside completed steps.
    pub step_time: Duration,
    /// Longest single completed step.
    pub max_step_time: Duration,
}

/// A topology, its solver, and the loop that advances them in time.
pub struct Simulation {
    topology: SystemTopology,
    config: SimulationConfig,
    solver: CachedSolver,
    scheduler: Box<dyn Scheduler>,
    events: EventManager,
    loggers: Vec<Box<dyn DataLogger>>,
    /// `None` after a topology change until the next step rebuilds it.
    graph: Option<TaskGraph>,
    /// One per component, reused across steps.
    buffers: Vec<StampBuffer>,
    step_index: u64,
    stats: SimulationStats,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("time", &self.time())
            .field("scheduler", &self.scheduler.name())
            .field("backend", &self.solver.backend_kind())
            .field("pending_events", &self.events.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Simulation {
    /// Set up a simulation of `topology`.
    ///
    /// The configuration and the topology are both checked here: a
    /// component wired to a missing node fails before any step runs.
    pub fn new(topology: SystemTopology, config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let scheduler = config
            .scheduler
            .build()
            .map_err(|e| SimulationError::from_scheduling(0.0, e))?;

        #[cfg(feature = "cuda")]
        let backend = config
            .solver
            .build_with(switchyard_backend_cuda::build_backend);
        #[cfg(not(feature = "cuda"))]
        let backend = config.solver.build();
        let backend = backend.map_err(|e| SimulationError::new(0.0, ErrorKind::Solver(e)))?;

        let events = EventManager::new(config.time_step * EVENT_TOLERANCE);
        let mut sim = Self {
            topology,
            config,
            solver: CachedSolver::new(backend),
            scheduler,
            events,
            loggers: Vec::new(),
            graph: None,
            buffers: Vec::new(),
            step_index: 0,
            stats: SimulationStats::default(),
        };
        sim.rebuild(0.0)?;

        log::info!(
            "simulation ready: {} {} components, dt={}s, T={}s, solver {}, {} scheduler",
            sim.topology.component_count(),
            sim.topology.domain(),
            sim.config.time_step,
            sim.config.final_time,
            sim.config.solver.describe(sim.system_size()),
            sim.scheduler.name()
        );
        Ok(sim)
    }

    /// Queue a switch or parameter event.
    pub fn add_event(&mut self, event: SwitchEvent) {
        self.events.schedule(event);
    }

    pub fn add_logger<L: DataLogger + 'static>(&mut self, logger: L) {
        self.loggers.push(Box::new(logger));
    }

    /// Time the next step will solve for.
    pub fn time(&self) -> f64 {
        self.step_index as f64 * self.config.time_step
    }

    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    pub fn solver_stats(&self) -> SolverStats {
        self.solver.stats()
    }

    /// Backend doing the linear solves right now.
    pub fn backend_kind(&self) -> BackendKind {
        self.solver.backend_kind()
    }

    pub fn topology(&self) -> &SystemTopology {
        &self.topology
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    /// Real dimension of the current system, zero before the first graph.
    pub fn system_size(&self) -> usize {
        self.graph
            .as_ref()
            .and_then(|g| g.unknowns())
            .map_or(0, |u| u.system_size())
    }

    fn rebuild(&mut self, time: f64) -> Result<()> {
        let graph = TaskGraph::build(&self.topology)
            .map_err(|e| SimulationError::from_scheduling(time, e))?;
        let unknowns = graph
            .unknowns()
            .ok_or_else(|| SimulationError::config(time, "task graph has no unknown layout"))?;

        self.buffers = vec![
            StampBuffer::new(self.topology.domain(), unknowns.len());
            self.topology.component_count()
        ];
        self.solver.invalidate_topology();
        self.stats.graph_builds += 1;
        log::debug!(
            "t={}s: task graph rebuilt ({} tasks, system size {})",
            time,
            graph.len(),
            unknowns.system_size()
        );
        self.graph = Some(graph);
        Ok(())
    }

    fn apply_events(&mut self, time: f64) -> Result<()> {
        for event in self.events.due(time) {
            let applied = self
                .topology
                .apply_event(event.target, &event.action)
                .map_err(|e| SimulationError::new(time, ErrorKind::System(e)))?;
            log::debug!(
                "t={}s: {} on {} ({:?})",
                time,
                event.action,
                event.target,
                applied
            );
            // The graph must not outlive a topology change, even when a
            // later event in this batch fails.
            if applied == EventEffect::Topology {
                self.graph = None;
            }
            self.stats.events_applied += 1;
        }
        Ok(())
    }

    /// Advance one step and return its results.
    pub fn step(&mut self) -> Result<StepResults> {
        let started = Instant::now();
        let time = self.time();

        self.apply_events(time)?;
        if self.graph.is_none() {
            self.rebuild(time)?;
        }
        let Some(graph) = self.graph.as_ref() else {
            return Err(SimulationError::config(time, "no task graph to run"));
        };
        let Some(unknowns) = graph.unknowns() else {
            return Err(SimulationError::config(time, "task graph has no unknown layout"));
        };

        let frequency = self.topology.frequency();
        let buffers = std::mem::take(&mut self.buffers);
        let (nodes, components) = self.topology.split_mut();
        let runner = StepRunner::new(
            time,
            self.config.time_step,
            frequency,
            unknowns,
            nodes,
            components,
            buffers,
            &mut self.solver,
        );
        let outcome = self.scheduler.execute(graph, &runner);
        self.buffers = runner.into_buffers();
        outcome.map_err(|e| SimulationError::from_scheduling(time, e))?;

        let mut results = StepResults::capture(self.step_index, time, &self.topology);
        results.wall_time = started.elapsed();
        for logger in &mut self.loggers {
            logger
                .log_step(&results)
                .map_err(|e| SimulationError::new(time, ErrorKind::Logger(e.to_string())))?;
        }

        self.step_index += 1;
        self.stats.steps += 1;
        self.stats.step_time += results.wall_time;
        self.stats.max_step_time = self.stats.max_step_time.max(results.wall_time);
        log::trace!("t={}s: step took {:?}", time, results.wall_time);
        Ok(results)
    }

    /// Step until the final time or a configured limit is reached.
    ///
    /// Loggers are finished when the run stops normally. An error aborts
    /// the run immediately and is returned with the time it occurred at.
    pub fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let first = self.step_index;
        let target = self.config.step_count();

        let stop_reason = loop {
            if self.step_index >= target {
                break StopReason::FinalTime;
            }
            if self.config.max_steps.is_some_and(|max| self.step_index >= max) {
                break StopReason::MaxSteps;
            }
            if self
                .config
                .max_wall_time
                .is_some_and(|limit| started.elapsed() >= limit)
            {
                break StopReason::WallClock;
            }
            self.step()?;
        };

        let time = self.time();
        for logger in &mut self.loggers {
            logger
                .finish()
                .map_err(|e| SimulationError::new(time, ErrorKind::Logger(e.to_string())))?;
        }

        let summary = RunSummary {
            steps: self.step_index - first,
            final_time: time,
            stop_reason,
            wall_time: started.elapsed(),
        };
        let solver = self.solver.stats();
        log::info!(
            "run stopped ({:?}) at t={}s after {} steps in {:.3?}: {} factorizations, {} refactorizations, {} reuses",
            summary.stop_reason,
            summary.final_time,
            summary.steps,
            summary.wall_time,
            solver.factorizations,
            solver.refactorizations,
            solver.reuses
        );
        Ok(summary)
    }
}
