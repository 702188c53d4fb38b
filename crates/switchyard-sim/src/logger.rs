//! Per-step results and the loggers that receive them.

use num_complex::Complex64;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchyard_core::{Domain, SystemTopology};

/// Node voltages and component currents after one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResults {
    /// Zero-based step index.
    pub step: u64,
    /// Simulation time the step solved for, in seconds.
    pub time: f64,
    pub domain: Domain,
    /// Voltage of every non-ground node, in insertion order.
    pub node_voltages: Vec<(String, Complex64)>,
    /// Current of every component that reports one, in component order.
    pub currents: Vec<(String, Complex64)>,
    /// Wall time taken by the step, up to capturing these results.
    pub wall_time: Duration,
}

impl StepResults {
    /// Snapshot the solved state held by `topology`.
    pub fn capture(step: u64, time: f64, topology: &SystemTopology) -> Self {
        Self {
            step,
            time,
            domain: topology.domain(),
            node_voltages: topology
                .nodes()
                .map(|n| (n.name().to_string(), n.voltage()))
                .collect(),
            currents: topology
                .components()
                .filter_map(|(_, c)| c.current().map(|i| (c.name().to_string(), i)))
                .collect(),
            wall_time: Duration::ZERO,
        }
    }

    pub fn voltage(&self, node: &str) -> Option<Complex64> {
        self.node_voltages
            .iter()
            .find(|(name, _)| name == node)
            .map(|(_, v)| *v)
    }

    pub fn current(&self, component: &str) -> Option<Complex64> {
        self.currents
            .iter()
            .find(|(name, _)| name == component)
            .map(|(_, i)| *i)
    }
}

/// Receives results after every completed step.
pub trait DataLogger: Send {
    fn log_step(&mut self, results: &StepResults) -> io::Result<()>;

    /// Called once when a run ends without error.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps every step in memory.
///
/// Clones share the same storage, so a handle kept by the caller sees what
/// the simulation logged.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    steps: Arc<Mutex<Vec<StepResults>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything logged so far.
    pub fn results(&self) -> Vec<StepResults> {
        self.steps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Voltage trace of one node as `(time, voltage)` pairs.
    pub fn voltage_trace(&self, node: &str) -> Vec<(f64, Complex64)> {
        self.results()
            .iter()
            .filter_map(|r| r.voltage(node).map(|v| (r.time, v)))
            .collect()
    }
}

impl DataLogger for MemoryLogger {
    fn log_step(&mut self, results: &StepResults) -> io::Result<()> {
        self.steps
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?
            .push(results.clone());
        Ok(())
    }
}

/// Writes one CSV row per step.
///
/// Columns are `time`, then `V(node)` per node and `I(component)` per
/// current. In the DP domain each value becomes a `.re` and an `.im`
/// column. A new header line is written whenever the set of columns
/// changes, for example after a component is removed.
pub struct CsvLogger<W: Write + Send> {
    writer: W,
    columns: Vec<String>,
}

impl<W: Write + Send> CsvLogger<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            columns: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn columns_for(results: &StepResults) -> Vec<String> {
        let mut columns = vec!["time".to_string()];
        let labels = results
            .node_voltages
            .iter()
            .map(|(n, _)| format!("V({n})"))
            .chain(results.currents.iter().map(|(c, _)| format!("I({c})")));
        for label in labels {
            match results.domain {
                Domain::Emt => columns.push(label),
                Domain::Dp => {
                    columns.push(format!("{label}.re"));
                    columns.push(format!("{label}.im"));
                }
            }
        }
        columns
    }
}

impl<W: Write + Send> DataLogger for CsvLogger<W> {
    fn log_step(&mut self, results: &StepResults) -> io::Result<()> {
        let columns = Self::columns_for(results);
        if columns != self.columns {
            writeln!(self.writer, "{}", columns.join(","))?;
            self.columns = columns;
        }

        write!(self.writer, "{}", results.time)?;
        let values = results
            .node_voltages
            .iter()
            .chain(results.currents.iter())
            .map(|(_, v)| v);
        for value in values {
            match results.domain {
                Domain::Emt => write!(self.writer, ",{}", value.re)?,
                Domain::Dp => write!(self.writer, ",{},{}", value.re, value.im)?,
            }
        }
        writeln!(self.writer)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(domain: Domain, time: f64) -> StepResults {
        StepResults {
            step: 0,
            time,
            domain,
            node_voltages: vec![("n1".into(), Complex64::new(1.5, -0.5))],
            currents: vec![("R1".into(), Complex64::new(0.25, 0.0))],
            wall_time: Duration::from_micros(40),
        }
    }

    #[test]
    fn test_csv_emt() {
        let mut logger = CsvLogger::new(Vec::new());
        logger.log_step(&sample(Domain::Emt, 0.0)).unwrap();
        logger.log_step(&sample(Domain::Emt, 0.5)).unwrap();

        let text = String::from_utf8(logger.into_inner()).unwrap();
        assert_eq!(text, "time,V(n1),I(R1)\n0,1.5,0.25\n0.5,1.5,0.25\n");
    }

    #[test]
    fn test_csv_dp_splits_columns() {
        let mut logger = CsvLogger::new(Vec::new());
        logger.log_step(&sample(Domain::Dp, 0.0)).unwrap();

        let text = String::from_utf8(logger.into_inner()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("time,V(n1).re,V(n1).im,I(R1).re,I(R1).im")
        );
        assert_eq!(lines.next(), Some("0,1.5,-0.5,0.25,0"));
    }

    #[test]
    fn test_csv_rewrites_header_on_column_change() {
        let mut logger = CsvLogger::new(Vec::new());
        logger.log_step(&sample(Domain::Emt, 0.0)).unwrap();
        let mut fewer = sample(Domain::Emt, 0.1);
        fewer.currents.clear();
        logger.log_step(&fewer).unwrap();

        let text = String::from_utf8(logger.into_inner()).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec!["time,V(n1),I(R1)", "0,1.5,0.25", "time,V(n1)", "0.1,1.5"]
        );
    }

    #[test]
    fn test_memory_logger_shares_storage() {
        let handle = MemoryLogger::new();
        let mut logger = handle.clone();
        logger.log_step(&sample(Domain::Emt, 0.0)).unwrap();
        logger.log_step(&sample(Domain::Emt, 1.0)).unwrap();

        assert_eq!(handle.len(), 2);
        let trace = handle.voltage_trace("n1");
        assert_eq!(trace[1].0, 1.0);
        assert_eq!(handle.results()[0].current("R1"), Some(Complex64::new(0.25, 0.0)));
    }
}
