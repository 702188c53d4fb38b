//! End-to-end runs of the simulation driver.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use num_complex::Complex64;
use switchyard_core::{
    Component, ComponentId, Domain, Error, EventAction, EventEffect, NodeId, Result,
    StampBuffer, StampContext, SystemTopology,
};
use switchyard_devices::{Capacitor, Resistor, Sinusoid, Switch, VoltageSource};
use switchyard_sim::{
    CsvLogger, ErrorKind, MemoryLogger, SchedulerKind, Simulation, SimulationConfig, StopReason,
    SwitchEvent,
};
use switchyard_solver::{BackendKind, SolverConfig};

/// V1 drives n1; R1 feeds n2, which is loaded by R2 and by R3 behind S1.
fn switched_divider() -> (SystemTopology, ComponentId) {
    let mut topo = SystemTopology::new(Domain::Emt, 50.0);
    let n1 = topo.add_node("n1");
    let n2 = topo.add_node("n2");
    let n3 = topo.add_node("n3");
    topo.add(VoltageSource::dc("V1", n1, NodeId::GROUND, 10.0))
        .unwrap();
    topo.add(Resistor::new("R1", n1, n2, 1000.0)).unwrap();
    topo.add(Resistor::new("R2", n2, NodeId::GROUND, 1000.0))
        .unwrap();
    let s1 = topo
        .add(Switch::new("S1", n2, n3, 1e9, 1e-3, true))
        .unwrap();
    topo.add(Resistor::new("R3", n3, NodeId::GROUND, 1000.0))
        .unwrap();
    (topo, s1)
}

/// RC ladder with a switch splitting it in half.
fn rc_ladder(sections: usize) -> (SystemTopology, ComponentId) {
    let mut topo = SystemTopology::new(Domain::Emt, 50.0);
    let source = topo.add_node("src");
    topo.add(VoltageSource::new(
        "V1",
        source,
        NodeId::GROUND,
        Sinusoid::new(100.0, 0.3, 50.0),
    ))
    .unwrap();

    let mut prev = source;
    let mut switch = None;
    for k in 0..sections {
        let node = topo.add_node(format!("n{k}"));
        if k == sections / 2 {
            switch = Some(
                topo.add(Switch::new(format!("S{k}"), prev, node, 1e8, 0.01, true))
                    .unwrap(),
            );
        } else {
            topo.add(Resistor::new(format!("R{k}"), prev, node, 10.0 + k as f64))
                .unwrap();
        }
        topo.add(Capacitor::new(format!("C{k}"), node, NodeId::GROUND, 1e-5))
            .unwrap();
        prev = node;
    }
    topo.add(Resistor::new("Rload", prev, NodeId::GROUND, 50.0))
        .unwrap();
    (topo, switch.unwrap())
}

fn close(a: Complex64, b: f64, tol: f64) -> bool {
    (a.re - b).abs() < tol && a.im.abs() < tol
}

#[test]
fn test_switch_opening_changes_operating_point() {
    let (topo, s1) = switched_divider();
    let mut sim = Simulation::new(topo, SimulationConfig::new(0.1, 1.0)).unwrap();
    sim.add_event(SwitchEvent::open(0.5, s1));
    let log = MemoryLogger::new();
    sim.add_logger(log.clone());

    let summary = sim.run().unwrap();
    assert_eq!(summary.steps, 10);
    assert_eq!(summary.stop_reason, StopReason::FinalTime);

    let trace = log.voltage_trace("n2");
    assert_eq!(trace.len(), 10);
    for (k, (_, v)) in trace.iter().enumerate() {
        let expected = if k < 5 { 10.0 / 3.0 } else { 5.0 };
        assert!(close(*v, expected, 1e-4), "step {k}: {v}");
    }

    assert_eq!(sim.stats().graph_builds, 2);
    assert_eq!(sim.stats().events_applied, 1);
    let solver = sim.solver_stats();
    assert_eq!(solver.factorizations, 2);
    assert_eq!(solver.refactorizations, 0);
    assert_eq!(solver.solves, 10);
    assert_eq!(solver.reuses, 8);
}

#[test]
fn test_unchanged_matrix_factorized_once() {
    let mut topo = SystemTopology::new(Domain::Emt, 50.0);
    let n1 = topo.add_node("n1");
    let n2 = topo.add_node("n2");
    topo.add(VoltageSource::dc("V1", n1, NodeId::GROUND, 10.0))
        .unwrap();
    topo.add(Resistor::new("R1", n1, n2, 100.0)).unwrap();
    topo.add(Capacitor::new("C1", n2, NodeId::GROUND, 1e-6))
        .unwrap();

    let mut sim = Simulation::new(topo, SimulationConfig::new(1e-5, 1e-3)).unwrap();
    let log = MemoryLogger::new();
    sim.add_logger(log.clone());
    sim.run().unwrap();

    let solver = sim.solver_stats();
    assert_eq!(solver.solves, 100);
    assert_eq!(solver.factorizations, 1);
    assert_eq!(solver.refactorizations, 0);
    assert_eq!(sim.stats().graph_builds, 1);

    // the capacitor charges monotonically towards the source voltage
    let trace = log.voltage_trace("n2");
    assert!(trace.windows(2).all(|w| w[1].1.re >= w[0].1.re));
    assert!(trace[trace.len() - 1].1.re > 9.9);
}

#[test]
fn test_parameter_event_refactorizes() {
    let (topo, _) = switched_divider();
    let mut sim = Simulation::new(topo, SimulationConfig::new(0.25, 1.0)).unwrap();
    let r2 = sim.topology().component_by_name("R2").unwrap();
    sim.add_event(SwitchEvent::set_parameter(0.5, r2, "resistance", 500.0));
    sim.run().unwrap();

    assert_eq!(sim.stats().graph_builds, 1);
    let solver = sim.solver_stats();
    assert_eq!(solver.factorizations, 1);
    assert_eq!(solver.refactorizations, 1);
    assert_eq!(solver.reuses, 2);
}

#[test]
fn test_sequential_and_parallel_agree() {
    let run = |scheduler: SchedulerKind| {
        let (topo, switch) = rc_ladder(24);
        let config = SimulationConfig::new(1e-4, 2e-2).with_scheduler(scheduler);
        let mut sim = Simulation::new(topo, config).unwrap();
        sim.add_event(SwitchEvent::open(5e-3, switch));
        sim.add_event(SwitchEvent::close(1.2e-2, switch));
        let log = MemoryLogger::new();
        sim.add_logger(log.clone());
        sim.run().unwrap();
        log.results()
    };

    let sequential = run(SchedulerKind::Sequential);
    let parallel = run(SchedulerKind::Parallel { threads: 4 });
    assert_eq!(sequential.len(), parallel.len());

    for (s, p) in sequential.iter().zip(&parallel) {
        assert_eq!(s.time, p.time);
        for ((name, a), (_, b)) in s.node_voltages.iter().zip(&p.node_voltages) {
            let scale = a.norm().max(1.0);
            assert!((a - b).norm() / scale < 1e-9, "{name} at t={}", s.time);
        }
    }
}

#[test]
fn test_sparse_backend_matches_dense() {
    let run = |backend: BackendKind| {
        let (topo, switch) = rc_ladder(30);
        let config =
            SimulationConfig::new(1e-4, 1e-2).with_solver(SolverConfig::new(backend));
        let mut sim = Simulation::new(topo, config).unwrap();
        sim.add_event(SwitchEvent::open(4e-3, switch));
        let log = MemoryLogger::new();
        sim.add_logger(log.clone());
        sim.run().unwrap();
        (log.results(), sim.backend_kind())
    };

    let (dense, dense_kind) = run(BackendKind::Dense);
    let (sparse, sparse_kind) = run(BackendKind::Sparse);
    assert_eq!(dense_kind, BackendKind::Dense);
    assert_eq!(sparse_kind, BackendKind::Sparse);

    for (d, s) in dense.iter().zip(&sparse) {
        for ((name, a), (_, b)) in d.node_voltages.iter().zip(&s.node_voltages) {
            assert!((a - b).norm() / a.norm().max(1.0) < 1e-9, "{name}");
        }
    }
}

#[test]
fn test_same_time_events_apply_in_insertion_order() {
    let run = |scheduler: SchedulerKind, first: SwitchEvent, second: SwitchEvent| {
        let (topo, _) = switched_divider();
        let config = SimulationConfig::new(0.25, 1.0).with_scheduler(scheduler);
        let mut sim = Simulation::new(topo, config).unwrap();
        sim.add_event(first);
        sim.add_event(second);
        let log = MemoryLogger::new();
        sim.add_logger(log.clone());
        sim.run().unwrap();
        assert_eq!(sim.stats().events_applied, 2);
        log.voltage_trace("n2")
    };

    let (_, s1) = switched_divider();
    for scheduler in [SchedulerKind::Sequential, SchedulerKind::Parallel { threads: 4 }] {
        // open then close leaves the switch closed
        let trace = run(scheduler, SwitchEvent::open(0.5, s1), SwitchEvent::close(0.5, s1));
        for (t, v) in &trace {
            assert!(close(*v, 10.0 / 3.0, 1e-4), "{scheduler:?} t={t}: {v}");
        }

        // close then open leaves it open from t=0.5 on
        let trace = run(scheduler, SwitchEvent::close(0.5, s1), SwitchEvent::open(0.5, s1));
        for (t, v) in &trace {
            let expected = if *t < 0.5 { 10.0 / 3.0 } else { 5.0 };
            assert!(close(*v, expected, 1e-4), "{scheduler:?} t={t}: {v}");
        }
    }
}

#[test]
fn test_failed_event_batch_still_rebuilds_after_toggle() {
    let (topo, s1) = switched_divider();
    let mut sim = Simulation::new(topo, SimulationConfig::new(0.25, 1.0)).unwrap();
    sim.add_event(SwitchEvent::open(0.25, s1));
    sim.add_event(SwitchEvent::open(0.25, ComponentId::new(99)));
    sim.step().unwrap();

    let err = sim.step().unwrap_err();
    assert!(err.is_system(), "{err}");
    assert_eq!(err.time, 0.25);

    // the toggle that did apply forces a fresh graph and factorization
    let results = sim.step().unwrap();
    assert_eq!(results.time, 0.25);
    assert!(close(results.voltage("n2").unwrap(), 5.0, 1e-4));
    assert_eq!(sim.stats().graph_builds, 2);
    let solver = sim.solver_stats();
    assert_eq!(solver.factorizations, 2);
    assert_eq!(solver.refactorizations, 0);
}

#[test]
fn test_failed_event_batch_still_rebuilds_after_removal() {
    let (topo, s1) = switched_divider();
    let mut sim = Simulation::new(topo, SimulationConfig::new(0.25, 1.0)).unwrap();
    sim.add_event(SwitchEvent::remove(0.25, s1));
    sim.add_event(SwitchEvent::open(0.25, ComponentId::new(99)));
    sim.step().unwrap();
    assert!(sim.step().is_err());

    let results = sim.step().unwrap();
    assert!(results.current("S1").is_none());
    assert!(close(results.voltage("n2").unwrap(), 5.0, 1e-4));
    assert_eq!(sim.stats().graph_builds, 2);
}

#[test]
fn test_step_wall_times_are_recorded() {
    let (topo, _) = switched_divider();
    let mut sim = Simulation::new(topo, SimulationConfig::new(0.25, 1.0)).unwrap();
    let log = MemoryLogger::new();
    sim.add_logger(log.clone());
    sim.run().unwrap();

    let results = log.results();
    let total: std::time::Duration = results.iter().map(|r| r.wall_time).sum();
    let longest = results.iter().map(|r| r.wall_time).max().unwrap();
    assert_eq!(sim.stats().step_time, total);
    assert_eq!(sim.stats().max_step_time, longest);
    assert!(total > std::time::Duration::ZERO);
}

#[test]
fn test_past_event_applies_at_next_step() {
    let (topo, s1) = switched_divider();
    let mut sim = Simulation::new(topo, SimulationConfig::new(0.25, 1.0)).unwrap();
    sim.step().unwrap();
    sim.step().unwrap();

    sim.add_event(SwitchEvent::open(0.1, s1));
    let results = sim.step().unwrap();
    assert_eq!(results.time, 0.5);
    assert!(close(results.voltage("n2").unwrap(), 5.0, 1e-4));
    assert!(sim.events().is_empty());
}

/// Shunt conductance whose value can be set to zero.
#[derive(Debug)]
struct Shunt {
    node: NodeId,
    g: f64,
}

impl Component for Shunt {
    fn name(&self) -> &str {
        "G1"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node, NodeId::GROUND]
    }

    fn stamp(&self, buffer: &mut StampBuffer, ctx: &StampContext<'_>) -> Result<()> {
        buffer.stamp_conductance(ctx.node(self.node), None, self.g);
        Ok(())
    }

    fn apply_event(&mut self, action: &EventAction) -> Result<EventEffect> {
        match action {
            EventAction::SetParameter { value, .. } => {
                self.g = *value;
                Ok(EventEffect::Values)
            }
            other => Err(Error::UnsupportedEvent {
                component: "G1".into(),
                action: other.to_string(),
            }),
        }
    }
}

#[test]
fn test_singular_matrix_reports_time() {
    let mut topo = SystemTopology::new(Domain::Emt, 50.0);
    let n1 = topo.add_node("n1");
    let shunt = topo.add(Shunt { node: n1, g: 1.0 }).unwrap();

    let mut sim = Simulation::new(topo, SimulationConfig::new(0.25, 1.0)).unwrap();
    sim.add_event(SwitchEvent::set_parameter(0.5, shunt, "g", 0.0));

    let err = sim.run().unwrap_err();
    assert!(err.is_solver(), "{err}");
    assert_eq!(err.time, 0.5);
    assert!(matches!(
        err.kind,
        ErrorKind::Solver(switchyard_solver::Error::SingularMatrix)
    ));
    assert_eq!(sim.stats().steps, 2);
}

#[test]
fn test_malformed_topology_rejected_before_stepping() {
    let mut topo = SystemTopology::new(Domain::Emt, 50.0);
    let n1 = topo.add_node("n1");
    topo.add(Resistor::new("R1", n1, NodeId::new(42), 1.0))
        .unwrap();

    let err = Simulation::new(topo, SimulationConfig::default()).unwrap_err();
    assert!(err.is_system(), "{err}");
    assert_eq!(err.time, 0.0);
}

#[test]
fn test_unknown_event_target_is_system_error() {
    let (topo, _) = switched_divider();
    let mut sim = Simulation::new(topo, SimulationConfig::new(0.25, 1.0)).unwrap();
    sim.add_event(SwitchEvent::open(0.25, ComponentId::new(99)));

    let err = sim.run().unwrap_err();
    assert!(err.is_system());
    assert_eq!(err.time, 0.25);
}

#[test]
fn test_invalid_config_rejected() {
    let (topo, _) = switched_divider();
    let err = Simulation::new(topo, SimulationConfig::new(0.0, 1.0)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Config(_)));
}

#[test]
fn test_max_steps_stops_early() {
    let (topo, _) = switched_divider();
    let config = SimulationConfig::new(0.1, 1.0).with_max_steps(3);
    let mut sim = Simulation::new(topo, config).unwrap();

    let summary = sim.run().unwrap();
    assert_eq!(summary.stop_reason, StopReason::MaxSteps);
    assert_eq!(summary.steps, 3);
}

#[test]
fn test_dp_rc_reaches_phasor_steady_state() {
    let mut topo = SystemTopology::new(Domain::Dp, 50.0);
    let n1 = topo.add_node("n1");
    let n2 = topo.add_node("n2");
    topo.add(VoltageSource::new(
        "V1",
        n1,
        NodeId::GROUND,
        Sinusoid::new(10.0, 0.0, 50.0),
    ))
    .unwrap();
    topo.add(Resistor::new("R1", n1, n2, 1000.0)).unwrap();
    // |Zc| = 1 kΩ at 50 Hz
    let c = 1.0 / (2.0 * std::f64::consts::PI * 50.0 * 1000.0);
    topo.add(Capacitor::new("C1", n2, NodeId::GROUND, c))
        .unwrap();

    let mut sim = Simulation::new(topo, SimulationConfig::new(1e-4, 0.1)).unwrap();
    assert_eq!(sim.system_size(), 6);
    let log = MemoryLogger::new();
    sim.add_logger(log.clone());
    sim.run().unwrap();

    let last = log.results().pop().unwrap();
    assert_eq!(last.domain, Domain::Dp);
    let v2 = last.voltage("n2").unwrap();
    assert!((v2 - Complex64::new(5.0, -5.0)).norm() < 1e-3, "{v2}");
    assert_eq!(sim.solver_stats().factorizations, 1);
}

/// Write target the test keeps a handle to.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_csv_logger_records_every_step() {
    let (topo, s1) = switched_divider();
    let mut sim = Simulation::new(topo, SimulationConfig::new(0.25, 1.0)).unwrap();
    sim.add_event(SwitchEvent::remove(0.5, s1));
    let out = SharedBuffer::default();
    sim.add_logger(CsvLogger::new(out.clone()));
    sim.run().unwrap();

    let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "time,V(n1),V(n2),V(n3),I(V1),I(R1),I(R2),I(S1),I(R3)"
    );
    assert!(lines[1].starts_with("0,"));
    assert!(lines[4].starts_with("0.5,"));
    // removing S1 drops its column and starts a new header
    assert_eq!(lines[3], "time,V(n1),V(n2),V(n3),I(V1),I(R1),I(R2),I(R3)");
    assert_eq!(lines.len(), 6);
}
