//! The work behind each task of one time step.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock};

use nalgebra::DVector;
use num_complex::Complex64;
use switchyard_core::{
    Component, ComponentId, MnaSystem, Node, SolutionView, StampBuffer, StampContext, UnknownMap,
};
use switchyard_sched::{Task, TaskError, TaskKind, TaskRunner};
use switchyard_solver::CachedSolver;

fn lock<'m, T>(mutex: &'m Mutex<T>, what: &str) -> Result<MutexGuard<'m, T>, TaskError> {
    mutex
        .lock()
        .map_err(|_| format!("{what} lock poisoned by an earlier task").into())
}

/// Mutable state of one step, shared by the tasks that run it.
///
/// Each component and its stamp buffer sit behind their own lock, so stamp
/// tasks of different components never contend. The solution is written
/// once by the solve task and read by everything after it.
pub(crate) struct StepRunner<'a> {
    time: f64,
    time_step: f64,
    frequency: f64,
    unknowns: &'a UnknownMap,
    slots: HashMap<ComponentId, usize>,
    components: Vec<Mutex<&'a mut Box<dyn Component>>>,
    buffers: Vec<Mutex<StampBuffer>>,
    solver: Mutex<&'a mut CachedSolver>,
    solution: OnceLock<DVector<f64>>,
    nodes: Mutex<Vec<&'a mut Node>>,
}

impl<'a> StepRunner<'a> {
    /// `buffers` must hold one buffer per component, in component order.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        time: f64,
        time_step: f64,
        frequency: f64,
        unknowns: &'a UnknownMap,
        nodes: impl Iterator<Item = &'a mut Node>,
        components: impl Iterator<Item = (ComponentId, &'a mut Box<dyn Component>)>,
        buffers: Vec<StampBuffer>,
        solver: &'a mut CachedSolver,
    ) -> Self {
        let mut slots = HashMap::new();
        let components = components
            .enumerate()
            .map(|(slot, (id, component))| {
                slots.insert(id, slot);
                Mutex::new(component)
            })
            .collect();
        Self {
            time,
            time_step,
            frequency,
            unknowns,
            slots,
            components,
            buffers: buffers.into_iter().map(Mutex::new).collect(),
            solver: Mutex::new(solver),
            solution: OnceLock::new(),
            nodes: Mutex::new(nodes.collect()),
        }
    }

    /// Hand the stamp buffers back for reuse by the next step.
    pub(crate) fn into_buffers(self) -> Vec<StampBuffer> {
        self.buffers
            .into_iter()
            .map(|b| b.into_inner().unwrap_or_else(|e| e.into_inner()))
            .collect()
    }

    fn context(&self, component: ComponentId) -> StampContext<'a> {
        StampContext::new(
            self.unknowns,
            component,
            self.time,
            self.time_step,
            self.frequency,
        )
    }

    fn slot(&self, component: ComponentId) -> Result<usize, TaskError> {
        self.slots
            .get(&component)
            .copied()
            .ok_or_else(|| format!("component {component} is not part of this step").into())
    }

    fn solution(&self) -> Result<&DVector<f64>, TaskError> {
        self.solution
            .get()
            .ok_or_else(|| "no solution available for this step".into())
    }

    fn stamp(&self, component: ComponentId) -> Result<(), TaskError> {
        let slot = self.slot(component)?;
        let device = lock(&self.components[slot], "component")?;
        let mut buffer = lock(&self.buffers[slot], "stamp buffer")?;
        buffer.clear();
        device.stamp(&mut buffer, &self.context(component))?;
        Ok(())
    }

    fn solve(&self) -> Result<(), TaskError> {
        let buffers = self
            .buffers
            .iter()
            .map(|b| lock(b, "stamp buffer"))
            .collect::<Result<Vec<_>, _>>()?;
        let system =
            MnaSystem::assemble(self.unknowns.system_size(), buffers.iter().map(|b| &**b))?;
        drop(buffers);

        let x = lock(&self.solver, "solver")?.solve_system(&system.matrix, &system.rhs)?;
        self.solution
            .set(x)
            .map_err(|_| "step solved twice".into())
    }

    fn post_step(&self, component: ComponentId) -> Result<(), TaskError> {
        let slot = self.slot(component)?;
        let solution = self.solution()?;
        let view = SolutionView::new(self.unknowns, solution, component);
        lock(&self.components[slot], "component")?.post_step(&view, &self.context(component));
        Ok(())
    }

    fn scatter(&self) -> Result<(), TaskError> {
        let solution = self.solution()?;
        for node in lock(&self.nodes, "node")?.iter_mut() {
            let voltage = match self.unknowns.node(node.id()) {
                Some(index) => self.unknowns.value(solution, index),
                None => Complex64::new(0.0, 0.0),
            };
            node.set_voltage(voltage);
        }
        Ok(())
    }
}

impl TaskRunner for StepRunner<'_> {
    fn run(&self, task: &Task) -> Result<(), TaskError> {
        match task.kind {
            TaskKind::Stamp(component) => self.stamp(component),
            TaskKind::Solve => self.solve(),
            TaskKind::PostStep(component) => self.post_step(component),
            TaskKind::Scatter => self.scatter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{Domain, NodeId, SystemTopology};
    use switchyard_devices::{Resistor, VoltageSource};
    use switchyard_sched::{Scheduler, SequentialScheduler, TaskGraph};
    use switchyard_solver::DenseLu;

    #[test]
    fn test_divider_step() {
        let mut topo = SystemTopology::new(Domain::Emt, 50.0);
        let n1 = topo.add_node("n1");
        let n2 = topo.add_node("n2");
        let spare = topo.add_node("spare");
        topo.add(VoltageSource::dc("V1", n1, NodeId::GROUND, 10.0))
            .unwrap();
        topo.add(Resistor::new("R1", n1, n2, 1000.0)).unwrap();
        topo.add(Resistor::new("R2", n2, NodeId::GROUND, 1000.0))
            .unwrap();

        let graph = TaskGraph::build(&topo).unwrap();
        let unknowns = graph.unknowns().unwrap();
        let buffers = vec![StampBuffer::new(Domain::Emt, unknowns.len()); 3];
        let mut solver = CachedSolver::new(Box::new(DenseLu::new()));

        let (nodes, components) = topo.split_mut();
        let runner = StepRunner::new(
            0.0, 1e-4, 50.0, unknowns, nodes, components, buffers, &mut solver,
        );
        SequentialScheduler.execute(&graph, &runner).unwrap();
        assert_eq!(runner.into_buffers().len(), 3);

        assert!((topo.node(n2).unwrap().voltage().re - 5.0).abs() < 1e-9);
        assert_eq!(topo.node(spare).unwrap().voltage(), Complex64::new(0.0, 0.0));
        let r1 = topo.component_by_name("R1").unwrap();
        let i = topo.component(r1).unwrap().current().unwrap();
        assert!((i.re - 5e-3).abs() < 1e-12);
        assert_eq!(solver.stats().factorizations, 1);
    }
}
